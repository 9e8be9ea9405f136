//! Curation run pipeline
//!
//! **Prepare** (before the human edits):
//! 1. Build the tag hierarchy from the classification table
//! 2. Load the publication hash lookup
//! 3. Parse current rows and split them by department
//! 4. Re-apply history (OTP for every department, homonyms where flagged)
//! 5. Assemble one artifact per department and attribute
//!
//! **Collect** (after the human edits):
//! 1. Extract decisions from every edited artifact into a staging store
//! 2. Reject the whole batch if any artifact fails or contradicts itself
//! 3. Merge the staging store into the history in one step
//!
//! A failed run leaves the history untouched.

use crate::artifact::{assemble, extract_decisions, Column, RejectedCell, UnitArtifact};
use crate::error::{CurateError, CurateResult};
use crate::hierarchy::{TagHierarchy, TagHierarchyBuilder};
use crate::history::{HistoryStore, KeyConflict, MergeSummary};
use crate::records::parse_records;
use crate::resolution::{split_by_department, CarryForwardEngine, ResolutionReport};
use bibcur_common::{Attribute, HashLookup, InstituteConfig, RawTable};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Raw tables supplied by upstream collaborators
pub struct RunInputs<'t> {
    /// Organizational classification registry
    pub org: &'t RawTable,
    /// Current attribution rows
    pub records: &'t RawTable,
    /// Publication id to stable hash lookup
    pub hashes: &'t RawTable,
}

/// Output of [`CurationRun::prepare`]
pub struct PreparedRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub hierarchy: TagHierarchy,
    pub artifacts: Vec<UnitArtifact>,
    pub reports: Vec<ResolutionReport>,
}

impl PreparedRun {
    pub fn undecided(&self) -> usize {
        self.artifacts.iter().map(UnitArtifact::undecided).sum()
    }

    /// JSON-friendly summary of the run
    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            artifacts: self.artifacts.iter().map(UnitArtifact::name).collect(),
            undecided: self.undecided(),
            reports: &self.reports,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub artifacts: Vec<String>,
    pub undecided: usize,
    pub reports: &'a [ResolutionReport],
}

/// Output of [`CurationRun::collect`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectSummary {
    pub artifacts: usize,
    pub extracted: usize,
    pub rejected: Vec<RejectedCell>,
    pub merge: MergeSummary,
    /// History keys whose recorded value changed with this batch
    pub conflicts: Vec<KeyConflict>,
}

/// One reprocessing run over a single institute configuration
pub struct CurationRun<'a> {
    config: &'a InstituteConfig,
}

impl<'a> CurationRun<'a> {
    pub fn new(config: &'a InstituteConfig) -> Self {
        Self { config }
    }

    /// Re-apply `history` to the current rows and assemble artifacts
    pub fn prepare(
        &self,
        inputs: &RunInputs<'_>,
        history: &HistoryStore,
    ) -> CurateResult<PreparedRun> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, institute = %self.config.name, "Preparing curation run");

        // Step 1
        let hierarchy = TagHierarchyBuilder::new(self.config)
            .build(inputs.org)
            .map_err(|e| CurateError::aborted("hierarchy", e))?;

        // Step 2
        let lookup = HashLookup::from_table(inputs.hashes, self.config)
            .map_err(|e| CurateError::aborted("hash lookup", e))?;

        // Step 3
        let rows = parse_records(inputs.records, self.config)
            .map_err(|e| CurateError::aborted("records", e))?;
        let slices = split_by_department(rows);

        // Steps 4-5
        let engine = CarryForwardEngine::new(self.config);
        let mut artifacts = Vec::new();
        let mut reports = Vec::new();
        for slice in &slices {
            let partition = engine.resolve_otp(slice, &lookup, history, &hierarchy);
            artifacts.push(assemble(&partition, Attribute::Otp, self.config));
            reports.push(partition.report);

            if slice.rows.iter().any(|r| r.homonym) {
                let partition = engine.resolve_homonyms(slice, &lookup, history);
                artifacts.push(assemble(&partition, Attribute::Homonym, self.config));
                reports.push(partition.report);
            }
        }

        let prepared = PreparedRun {
            run_id,
            started_at,
            hierarchy,
            artifacts,
            reports,
        };
        info!(
            %run_id,
            departments = slices.len(),
            artifacts = prepared.artifacts.len(),
            undecided = prepared.undecided(),
            "Curation run prepared"
        );
        Ok(prepared)
    }

    /// Extract decisions from edited artifacts and merge them into `history`
    ///
    /// All or nothing: on error `history` is left as it was.
    pub fn collect(
        &self,
        edited: &[RawTable],
        lookup: &HashLookup,
        hierarchy: &TagHierarchy,
        history: &mut HistoryStore,
    ) -> CurateResult<CollectSummary> {
        let mut staging = HistoryStore::new();
        let mut summary = CollectSummary {
            artifacts: edited.len(),
            ..Default::default()
        };

        // Step 1
        for table in edited {
            let attribute = artifact_attribute(table, self.config).ok_or_else(|| {
                CurateError::aborted(
                    "collect",
                    CurateError::ArtifactRejected {
                        artifact: table.name().to_string(),
                        reason: "no decision column".to_string(),
                    },
                )
            })?;
            let extraction = extract_decisions(table, attribute, lookup, hierarchy, self.config)
                .map_err(|e| CurateError::aborted("collect", e))?;

            // Step 2
            if let Some(conflict) = extraction.decisions.conflicts().first() {
                return Err(CurateError::aborted(
                    "collect",
                    CurateError::ArtifactRejected {
                        artifact: extraction.artifact.clone(),
                        reason: format!(
                            "{} set to both '{}' and '{}'",
                            conflict.key, conflict.discarded, conflict.kept
                        ),
                    },
                ));
            }

            summary.extracted += extraction.extracted;
            summary.rejected.extend(extraction.rejected);
            staging.merge(&extraction.decisions);
        }

        if let Some(conflict) = staging.conflicts().first() {
            return Err(CurateError::aborted(
                "collect",
                CurateError::ArtifactRejected {
                    artifact: "(batch)".to_string(),
                    reason: format!(
                        "two artifacts set {} to '{}' and '{}'",
                        conflict.key, conflict.discarded, conflict.kept
                    ),
                },
            ));
        }

        // Step 3
        let before = history.conflicts().len();
        summary.merge = history.merge(&staging);
        summary.conflicts = history.conflicts()[before..].to_vec();
        if !summary.conflicts.is_empty() {
            warn!(
                changed = summary.conflicts.len(),
                "Edited artifacts changed previously recorded decisions"
            );
        }
        info!(
            artifacts = summary.artifacts,
            extracted = summary.extracted,
            rejected = summary.rejected.len(),
            inserted = summary.merge.inserted,
            replaced = summary.merge.replaced,
            superseded = summary.merge.superseded,
            "Decisions collected"
        );
        Ok(summary)
    }
}

/// Attribute of an edited artifact, from its decision column
pub fn artifact_attribute(table: &RawTable, config: &InstituteConfig) -> Option<Attribute> {
    [Attribute::Homonym, Attribute::Otp].into_iter().find(|&attribute| {
        table
            .column_index(Column::decision(attribute).header(&config.record_columns))
            .is_some()
    })
}

/// File-system safe stem for an artifact
pub fn artifact_file_stem(artifact: &UnitArtifact) -> String {
    artifact
        .name()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
