//! Reverse direction: edited artifact to new history entries
//!
//! Only single concrete values become decisions. Choice placeholders and the
//! sentinel tag are skipped. OTP decisions are keyed by the publication hash
//! when one exists, otherwise by (DOI, first author). Homonym decisions need
//! the hash and are taken once per author slot.

use super::columns::Column;
use crate::hierarchy::TagHierarchy;
use crate::history::{HistoryKey, HistoryStore};
use crate::records::{parse_records, single_value};
use bibcur_common::{Attribute, AttributionRow, HashLookup, InstituteConfig, RawTable, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Edited value that could not be taken as a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedCell {
    pub position: usize,
    pub pub_id: String,
    pub value: String,
    pub reason: String,
}

/// Decisions found in one artifact
#[derive(Debug, Clone)]
pub struct Extraction {
    pub artifact: String,
    pub attribute: Attribute,
    /// New entries, ready to merge into the persisted history
    pub decisions: HistoryStore,
    pub extracted: usize,
    /// Cells still holding the choice list, or blank
    pub placeholders: usize,
    /// Cells set to the sentinel tag
    pub sentinels: usize,
    /// Decisions with no usable key
    pub unkeyed: usize,
    pub rejected: Vec<RejectedCell>,
}

impl Extraction {
    fn new(artifact: &str, attribute: Attribute) -> Self {
        Self {
            artifact: artifact.to_string(),
            attribute,
            decisions: HistoryStore::new(),
            extracted: 0,
            placeholders: 0,
            sentinels: 0,
            unkeyed: 0,
            rejected: Vec::new(),
        }
    }

    fn reject(&mut self, row: &AttributionRow, value: &str, reason: String) {
        warn!(
            artifact = %self.artifact,
            pub_id = %row.pub_id,
            value = %value,
            reason = %reason,
            "Edited value ignored"
        );
        self.rejected.push(RejectedCell {
            position: row.position,
            pub_id: row.pub_id.clone(),
            value: value.to_string(),
            reason,
        });
    }

    /// True when one key received two different values in this artifact
    pub fn has_conflicts(&self) -> bool {
        !self.decisions.conflicts().is_empty()
    }
}

/// Scan a human-edited artifact for new decisions
///
/// Fails with a configuration error when a required column is missing.
pub fn extract_decisions(
    table: &RawTable,
    attribute: Attribute,
    lookup: &HashLookup,
    hierarchy: &TagHierarchy,
    config: &InstituteConfig,
) -> Result<Extraction> {
    let decision_header = Column::decision(attribute).header(&config.record_columns);
    let decision_col = table.require_columns(&[decision_header])?[0];
    let rows = parse_records(table, config)?;

    let mut extraction = Extraction::new(table.name(), attribute);
    match attribute {
        Attribute::Otp => extract_otp(&rows, lookup, hierarchy, config, &mut extraction),
        Attribute::Homonym => {
            extract_homonyms(table, decision_col, &rows, lookup, config, &mut extraction)
        }
    }

    info!(
        artifact = %extraction.artifact,
        attribute = %attribute,
        extracted = extraction.extracted,
        placeholders = extraction.placeholders,
        sentinels = extraction.sentinels,
        unkeyed = extraction.unkeyed,
        rejected = extraction.rejected.len(),
        conflicts = extraction.decisions.conflicts().len(),
        "Decisions extracted"
    );
    Ok(extraction)
}

fn extract_otp(
    rows: &[AttributionRow],
    lookup: &HashLookup,
    hierarchy: &TagHierarchy,
    config: &InstituteConfig,
    extraction: &mut Extraction,
) {
    for row in rows {
        let value = match &row.otp {
            Some(value) => value,
            None => {
                extraction.placeholders += 1;
                continue;
            }
        };
        if *value == config.invalid_tag {
            extraction.sentinels += 1;
            continue;
        }
        if !hierarchy.is_legal(&row.unit, value) {
            extraction.reject(row, value, format!("not an allowed tag for {}", row.unit));
            continue;
        }

        let key = match lookup.get(&row.pub_id) {
            Some(hash) => HistoryKey::otp(&row.unit.department, hash.clone()),
            None if row.first_author.is_empty() => {
                extraction.unkeyed += 1;
                continue;
            }
            None => HistoryKey::secondary(&row.unit.department, row.doi.clone(), &row.first_author),
        };
        extraction.decisions.record(key, value);
        extraction.extracted += 1;
    }
}

fn extract_homonyms(
    table: &RawTable,
    decision_col: usize,
    rows: &[AttributionRow],
    lookup: &HashLookup,
    config: &InstituteConfig,
    extraction: &mut Extraction,
) {
    // Source position doubles as the table row index
    let mut slots: BTreeMap<(&str, u32), Vec<&AttributionRow>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.homonym) {
        slots
            .entry((row.pub_id.as_str(), row.author_idx))
            .or_default()
            .push(row);
    }

    for ((pub_id, author_idx), members) in slots {
        let mut values: Vec<String> = Vec::new();
        for row in &members {
            if let Some(value) = single_value(table.cell(row.position, decision_col), config) {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }

        let value = match values.as_slice() {
            [] => {
                extraction.placeholders += 1;
                continue;
            }
            [value] => value.clone(),
            _ => {
                extraction.reject(
                    members[0],
                    &values.join(&config.choice_separator),
                    "author slot has several kept matricules".to_string(),
                );
                continue;
            }
        };

        if !members.iter().any(|r| r.matricule == value) {
            extraction.reject(members[0], &value, "not one of the slot's candidates".to_string());
            continue;
        }

        match lookup.get(pub_id) {
            Some(hash) => {
                extraction
                    .decisions
                    .record(HistoryKey::homonym(hash.clone(), author_idx), &value);
                extraction.extracted += 1;
            }
            None => extraction.unkeyed += 1,
        }
    }
}
