//! Carry-forward resolution engine
//!
//! OTP pass, per row in source order:
//! 1. A row that already carries a legal tag is resolved as is.
//! 2. Otherwise the first tier with a recorded decision supplies the tag.
//! 3. A carried or present tag missing from the unit vocabulary is stale: the
//!    row is left undecided and the value reported.
//! 4. Everything else is undecided with the unit's allowed tags as choices.
//!
//! Homonym pass, per author slot `(publication, author position)`:
//! 1. Rows without the homonym flag are resolved with their own matricule.
//! 2. A recorded kept matricule resolves the matching row; its siblings are
//!    dropped.
//! 3. If the kept matricule is no longer a candidate, every sibling is
//!    dropped and the slot is reported as orphaned.
//! 4. Slots without a decision stay undecided with the candidate matricules
//!    as choices.

use super::{
    AuthorTier, CarryForwardTier, DoiTier, OrphanedSlot, Origin, Partition, PrimaryTier,
    StaleValue, Tier, UnitSlice,
};
use crate::hierarchy::TagHierarchy;
use crate::history::HistoryStore;
use bibcur_common::{Attribute, AttributionRow, HashLookup, InstituteConfig};
use std::collections::BTreeMap;
use tracing::{debug, info, info_span, warn};

/// Outcome of a homonym slot for one of its rows
enum SlotOutcome {
    Keep,
    Drop(String),
    Undecided(Vec<String>),
}

/// Re-applies the resolution history to current rows
pub struct CarryForwardEngine<'a> {
    config: &'a InstituteConfig,
}

impl<'a> CarryForwardEngine<'a> {
    pub fn new(config: &'a InstituteConfig) -> Self {
        Self { config }
    }

    /// Resolve the OTP tag of every row in `slice`
    pub fn resolve_otp<'h>(
        &self,
        slice: &UnitSlice,
        lookup: &'h HashLookup,
        history: &'h HistoryStore,
        hierarchy: &TagHierarchy,
    ) -> Partition {
        let span = info_span!(
            "resolve_otp",
            institute = %self.config.name,
            department = %slice.department
        );
        let _enter = span.enter();

        let primary = PrimaryTier::new(lookup, history);
        let doi = DoiTier::new(history);
        let author = AuthorTier::new(history);
        let tiers: [&dyn CarryForwardTier<'h>; 3] = [&primary, &doi, &author];

        let mut partition = Partition::new(&slice.department, Attribute::Otp, slice.rows.len());
        let mut ambiguous = BTreeMap::new();

        for row in &slice.rows {
            let choices = hierarchy.choices(&row.unit);

            // Step 1
            if let Some(value) = &row.otp {
                if choices.contains(value) {
                    partition.push_resolved(row.clone(), value.clone(), Origin::AlreadyResolved);
                } else {
                    warn!(
                        pub_id = %row.pub_id,
                        unit = %row.unit,
                        value = %value,
                        "Tag present in the current row is not allowed for its unit"
                    );
                    partition.report.stale.push(StaleValue {
                        pub_id: row.pub_id.clone(),
                        author_idx: row.author_idx,
                        value: value.clone(),
                        tier: None,
                    });
                    partition.push_undecided(row.clone(), choices.to_vec());
                }
                continue;
            }

            // Step 2
            let hit = tiers
                .iter()
                .find_map(|tier| tier.find(row).map(|hit| (tier.tier(), hit)));

            let (tier, hit) = match hit {
                Some(found) => found,
                None => {
                    partition.push_undecided(row.clone(), choices.to_vec());
                    continue;
                }
            };

            if let Some(ambiguity) = hit.ambiguity {
                ambiguous.entry(ambiguity.doi.clone()).or_insert(ambiguity);
            }

            // Step 3
            let value = &hit.entry.value;
            if choices.contains(value) {
                debug!(
                    pub_id = %row.pub_id,
                    author_idx = row.author_idx,
                    tier = %tier,
                    value = %value,
                    "Tag carried forward"
                );
                partition.push_resolved(row.clone(), value.clone(), Origin::CarriedForward(tier));
            } else {
                warn!(
                    pub_id = %row.pub_id,
                    unit = %row.unit,
                    tier = %tier,
                    value = %value,
                    "Recorded tag is no longer allowed for the unit; left undecided"
                );
                partition.report.stale.push(StaleValue {
                    pub_id: row.pub_id.clone(),
                    author_idx: row.author_idx,
                    value: value.clone(),
                    tier: Some(tier),
                });
                partition.push_undecided(row.clone(), choices.to_vec());
            }
        }

        for ambiguity in ambiguous.values() {
            warn!(
                doi = %ambiguity.doi,
                values = ?ambiguity.values,
                chosen = %ambiguity.chosen,
                "DOI recorded with several tags; applied the most recent"
            );
        }
        partition.report.ambiguous_dois = ambiguous.into_values().collect();

        log_summary(&partition);
        partition
    }

    /// Resolve homonym slots in `slice`
    pub fn resolve_homonyms<'h>(
        &self,
        slice: &UnitSlice,
        lookup: &'h HashLookup,
        history: &'h HistoryStore,
    ) -> Partition {
        let span = info_span!(
            "resolve_homonyms",
            institute = %self.config.name,
            department = %slice.department
        );
        let _enter = span.enter();

        let primary = PrimaryTier::new(lookup, history);
        let mut partition =
            Partition::new(&slice.department, Attribute::Homonym, slice.rows.len());

        let mut slots: BTreeMap<(&str, u32), Vec<usize>> = BTreeMap::new();
        for (i, row) in slice.rows.iter().enumerate() {
            if row.homonym {
                slots
                    .entry((row.pub_id.as_str(), row.author_idx))
                    .or_default()
                    .push(i);
            }
        }

        let mut outcomes: Vec<Option<SlotOutcome>> = slice.rows.iter().map(|_| None).collect();
        for ((pub_id, author_idx), members) in &slots {
            let mut candidates: Vec<String> = members
                .iter()
                .map(|&i| slice.rows[i].matricule.clone())
                .collect();
            candidates.sort();
            candidates.dedup();

            let kept = match primary.homonym_slot(pub_id, *author_idx) {
                Some(entry) => entry.value.clone(),
                None => {
                    // Step 4
                    for &i in members {
                        outcomes[i] = Some(SlotOutcome::Undecided(candidates.clone()));
                    }
                    continue;
                }
            };

            // Step 3
            if !candidates.contains(&kept) {
                warn!(
                    pub_id = %pub_id,
                    author_idx = *author_idx,
                    kept = %kept,
                    candidates = ?candidates,
                    "Kept matricule is no longer a candidate; all sibling rows dropped"
                );
                partition.report.orphaned_slots.push(OrphanedSlot {
                    pub_id: pub_id.to_string(),
                    author_idx: *author_idx,
                    kept: kept.clone(),
                    candidates,
                });
            }

            // Step 2
            for &i in members {
                outcomes[i] = Some(if slice.rows[i].matricule == kept {
                    SlotOutcome::Keep
                } else {
                    SlotOutcome::Drop(kept.clone())
                });
            }
        }

        for (row, outcome) in slice.rows.iter().zip(outcomes) {
            match outcome {
                // Step 1
                None => partition.push_resolved(
                    row.clone(),
                    row.matricule.clone(),
                    Origin::AlreadyResolved,
                ),
                Some(SlotOutcome::Keep) => {
                    debug!(
                        pub_id = %row.pub_id,
                        author_idx = row.author_idx,
                        matricule = %row.matricule,
                        "Homonym decision carried forward"
                    );
                    partition.push_resolved(
                        row.clone(),
                        row.matricule.clone(),
                        Origin::CarriedForward(Tier::Primary),
                    );
                }
                Some(SlotOutcome::Drop(kept)) => partition.push_dropped(row.clone(), &kept),
                Some(SlotOutcome::Undecided(choices)) => {
                    partition.push_undecided(row.clone(), choices)
                }
            }
        }

        log_summary(&partition);
        partition
    }
}

/// Group rows by department, keeping source order inside each slice
pub fn split_by_department(rows: Vec<AttributionRow>) -> Vec<UnitSlice> {
    let mut by_department: BTreeMap<String, Vec<AttributionRow>> = BTreeMap::new();
    for row in rows {
        by_department
            .entry(row.unit.department.clone())
            .or_default()
            .push(row);
    }
    by_department
        .into_iter()
        .map(|(department, rows)| UnitSlice { department, rows })
        .collect()
}

fn log_summary(partition: &Partition) {
    let report = &partition.report;
    info!(
        department = %report.department,
        attribute = %report.attribute,
        rows = report.rows,
        already_resolved = report.already_resolved,
        primary = report.carried.primary,
        doi = report.carried.doi,
        author = report.carried.author,
        undecided = report.undecided,
        dropped = report.dropped,
        "Resolution pass complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::TagHierarchyBuilder;
    use crate::history::HistoryKey;
    use bibcur_common::{Doi, RawTable, StableHash, UnitPath};

    fn hierarchy(config: &InstituteConfig) -> TagHierarchy {
        let table = RawTable::from_rows(
            "org",
            &["Department", "OTP", "Service", "Laboratory"],
            &[&["DEN", "A", "SERMA", "LPEC"], &["DEN", "B", "SERMA", "LPEC"]],
        );
        TagHierarchyBuilder::new(config).build(&table).unwrap()
    }

    fn hash(s: &str) -> StableHash {
        StableHash::new(s).unwrap()
    }

    fn row(position: usize, pub_id: &str, author: &str, doi: Doi) -> AttributionRow {
        AttributionRow {
            position,
            pub_id: pub_id.to_string(),
            author_idx: 0,
            first_author: author.to_string(),
            doi,
            matricule: format!("M{}", position),
            unit: UnitPath {
                department: "DEN".to_string(),
                laboratory: "LPEC".to_string(),
            },
            homonym: false,
            otp: None,
        }
    }

    fn slice(rows: Vec<AttributionRow>) -> UnitSlice {
        UnitSlice {
            department: "DEN".to_string(),
            rows,
        }
    }

    #[test]
    fn test_hash_decision_fills_row_with_unknown_doi() {
        let config = InstituteConfig::default();
        let hierarchy = hierarchy(&config);
        let mut lookup = HashLookup::new();
        lookup.insert("2024_007", hash("H1"));
        let mut history = HistoryStore::new();
        history.record(HistoryKey::otp("DEN", hash("H1")), "B");

        let slice = slice(vec![row(0, "2024_007", "Dupont, J.", Doi::Unknown)]);
        let partition =
            CarryForwardEngine::new(&config).resolve_otp(&slice, &lookup, &history, &hierarchy);

        assert!(partition.undecided.is_empty());
        assert_eq!(partition.resolved.len(), 1);
        assert_eq!(partition.resolved[0].row.pub_id, "2024_007");
        assert_eq!(partition.resolved[0].value, "B");
        assert_eq!(partition.resolved[0].origin, Origin::CarriedForward(Tier::Primary));
    }

    #[test]
    fn test_primary_tier_wins_over_lower_tiers() {
        let config = InstituteConfig::default();
        let hierarchy = hierarchy(&config);
        let mut lookup = HashLookup::new();
        lookup.insert("2024_001", hash("H1"));
        lookup.insert("2024_002", hash("H2"));
        let mut history = HistoryStore::new();
        history.record(HistoryKey::otp("DEN", hash("H1")), "A");
        history.record(HistoryKey::otp("DEN", hash("H2")), "A");
        history.record(HistoryKey::secondary("DEN", Doi::Known("10.1/x".into()), "Dupont, J."), "B");
        history.record(HistoryKey::secondary("DEN", Doi::Unknown, "Dupont, J."), "invalid");

        let slice = slice(vec![
            row(0, "2024_001", "Dupont, J.", Doi::Known("10.1/x".into())),
            row(1, "2024_002", "Dupont, J.", Doi::Unknown),
        ]);
        let partition =
            CarryForwardEngine::new(&config).resolve_otp(&slice, &lookup, &history, &hierarchy);

        assert_eq!(partition.resolved.len(), 2);
        for resolved in &partition.resolved {
            assert_eq!(resolved.value, "A");
            assert_eq!(resolved.origin, Origin::CarriedForward(Tier::Primary));
        }
    }

    #[test]
    fn test_doi_tier_fills_every_row_sharing_the_doi() {
        let config = InstituteConfig::default();
        let hierarchy = hierarchy(&config);
        let lookup = HashLookup::new();
        let mut history = HistoryStore::new();
        history.record(HistoryKey::secondary("DEN", Doi::Known("10.1/x".into()), "Dupont, J."), "B");

        let mut second = row(1, "2024_001", "Dupont, J.", Doi::Known("10.1/x".into()));
        second.author_idx = 4;
        let slice = slice(vec![
            row(0, "2024_001", "Dupont, J.", Doi::Known("10.1/x".into())),
            second,
        ]);
        let partition =
            CarryForwardEngine::new(&config).resolve_otp(&slice, &lookup, &history, &hierarchy);

        assert_eq!(partition.report.carried.doi, 2);
        assert!(partition.resolved.iter().all(|r| r.value == "B"));
    }

    #[test]
    fn test_author_tier_only_fills_matching_subset() {
        let config = InstituteConfig::default();
        let hierarchy = hierarchy(&config);
        let lookup = HashLookup::new();
        let mut history = HistoryStore::new();
        history.record(HistoryKey::secondary("DEN", Doi::Unknown, "Dupont, J."), "A");

        let slice = slice(vec![
            row(0, "2024_003", "Dupont, J.", Doi::Unknown),
            row(1, "2024_003", "Durand, P.", Doi::Unknown),
        ]);
        let partition =
            CarryForwardEngine::new(&config).resolve_otp(&slice, &lookup, &history, &hierarchy);

        assert_eq!(partition.resolved.len(), 1);
        assert_eq!(partition.resolved[0].row.first_author, "Dupont, J.");
        assert_eq!(partition.resolved[0].origin, Origin::CarriedForward(Tier::Author));
        assert_eq!(partition.undecided.len(), 1);
        assert_eq!(partition.undecided[0].row.first_author, "Durand, P.");
        assert_eq!(partition.undecided[0].choices, vec!["A", "B", "invalid"]);
    }

    #[test]
    fn test_every_row_lands_in_one_set_and_values_are_legal() {
        let config = InstituteConfig::default();
        let hierarchy = hierarchy(&config);
        let mut lookup = HashLookup::new();
        lookup.insert("2024_001", hash("H1"));
        lookup.insert("2024_002", hash("H2"));
        let mut history = HistoryStore::new();
        history.record(HistoryKey::otp("DEN", hash("H1")), "A");
        history.record(HistoryKey::otp("DEN", hash("H2")), "RETIRED");

        let mut present = row(2, "2024_004", "X", Doi::Unknown);
        present.otp = Some("B".to_string());
        let mut stale_present = row(3, "2024_005", "Y", Doi::Unknown);
        stale_present.otp = Some("OLD".to_string());

        let slice = slice(vec![
            row(0, "2024_001", "Dupont, J.", Doi::Unknown),
            row(1, "2024_002", "Dupont, J.", Doi::Unknown),
            present,
            stale_present,
            row(4, "2024_006", "Z", Doi::Unknown),
        ]);
        let partition =
            CarryForwardEngine::new(&config).resolve_otp(&slice, &lookup, &history, &hierarchy);

        assert_eq!(partition.len(), slice.rows.len());
        let mut positions: Vec<usize> = partition
            .resolved
            .iter()
            .map(|r| r.row.position)
            .chain(partition.undecided.iter().map(|u| u.row.position))
            .collect();
        positions.sort();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);

        for resolved in &partition.resolved {
            assert!(hierarchy.is_legal(&resolved.row.unit, &resolved.value));
        }
        for undecided in &partition.undecided {
            assert_eq!(undecided.choices.last().map(String::as_str), Some("invalid"));
        }

        assert_eq!(partition.report.already_resolved, 1);
        assert_eq!(partition.report.carried.primary, 1);
        assert_eq!(partition.report.stale.len(), 2);
        assert_eq!(partition.report.stale[0].tier, Some(Tier::Primary));
        assert_eq!(partition.report.stale[1].tier, None);
        assert_eq!(partition.undecided.len(), 3);
    }

    #[test]
    fn test_unknown_unit_still_offers_sentinel() {
        let config = InstituteConfig::default();
        let hierarchy = hierarchy(&config);
        let mut orphan = row(0, "2024_001", "X", Doi::Unknown);
        orphan.unit = UnitPath {
            department: "DNEW".to_string(),
            laboratory: "LNEW".to_string(),
        };
        let slice = UnitSlice {
            department: "DNEW".to_string(),
            rows: vec![orphan],
        };
        let partition = CarryForwardEngine::new(&config).resolve_otp(
            &slice,
            &HashLookup::new(),
            &HistoryStore::new(),
            &hierarchy,
        );
        assert_eq!(partition.undecided[0].choices, vec!["invalid"]);
    }

    #[test]
    fn test_ambiguous_doi_is_reported_once() {
        let config = InstituteConfig::default();
        let hierarchy = hierarchy(&config);
        let mut history = HistoryStore::new();
        history.record(HistoryKey::secondary("DEN", Doi::Known("10.1/x".into()), "Dupont, J."), "A");
        history.record(HistoryKey::secondary("DEN", Doi::Known("10.1/x".into()), "Martin, A."), "B");

        let slice = slice(vec![
            row(0, "2024_001", "Dupont, J.", Doi::Known("10.1/x".into())),
            row(1, "2024_001", "Martin, A.", Doi::Known("10.1/x".into())),
        ]);
        let partition = CarryForwardEngine::new(&config).resolve_otp(
            &slice,
            &HashLookup::new(),
            &history,
            &hierarchy,
        );

        assert!(partition.resolved.iter().all(|r| r.value == "B"));
        assert_eq!(partition.report.ambiguous_dois.len(), 1);
        assert_eq!(partition.report.ambiguous_dois[0].chosen, "B");
        assert!(partition.report.has_warnings());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let config = InstituteConfig::default();
        let hierarchy = hierarchy(&config);
        let mut lookup = HashLookup::new();
        lookup.insert("2024_001", hash("H1"));
        let mut history = HistoryStore::new();
        history.record(HistoryKey::otp("DEN", hash("H1")), "A");
        history.record(HistoryKey::secondary("DEN", Doi::Unknown, "Durand, P."), "B");

        let slice = slice(vec![
            row(0, "2024_001", "Dupont, J.", Doi::Unknown),
            row(1, "2024_002", "Durand, P.", Doi::Unknown),
            row(2, "2024_003", "Martin, A.", Doi::Known("10.1/z".into())),
        ]);
        let engine = CarryForwardEngine::new(&config);
        let first = engine.resolve_otp(&slice, &lookup, &history, &hierarchy);
        let second = engine.resolve_otp(&slice, &lookup, &history, &hierarchy);
        assert_eq!(first, second);
    }

    fn homonym_rows(matricules: &[&str]) -> Vec<AttributionRow> {
        matricules
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let mut r = row(i, "2024_010", "Dupont, J.", Doi::Unknown);
                r.matricule = m.to_string();
                r.homonym = true;
                r
            })
            .collect()
    }

    #[test]
    fn test_kept_matricule_survives_and_siblings_are_dropped() {
        let config = InstituteConfig::default();
        let mut lookup = HashLookup::new();
        lookup.insert("2024_010", hash("H1"));
        let mut history = HistoryStore::new();
        history.record(HistoryKey::homonym(hash("H1"), 0), "M2");

        let slice = slice(homonym_rows(&["M1", "M2", "M3"]));
        let partition =
            CarryForwardEngine::new(&config).resolve_homonyms(&slice, &lookup, &history);

        assert_eq!(partition.resolved.len(), 1);
        assert_eq!(partition.resolved[0].row.matricule, "M2");
        assert_eq!(partition.resolved[0].origin, Origin::CarriedForward(Tier::Primary));
        assert_eq!(partition.dropped.len(), 2);
        assert!(partition.dropped.iter().all(|d| d.kept == "M2"));
        assert!(partition.undecided.is_empty());
    }

    #[test]
    fn test_missing_kept_matricule_drops_every_sibling() {
        let config = InstituteConfig::default();
        let mut lookup = HashLookup::new();
        lookup.insert("2024_010", hash("H1"));
        let mut history = HistoryStore::new();
        history.record(HistoryKey::homonym(hash("H1"), 0), "M9");

        let slice = slice(homonym_rows(&["M1", "M2", "M3"]));
        let partition =
            CarryForwardEngine::new(&config).resolve_homonyms(&slice, &lookup, &history);

        assert!(partition.resolved.is_empty());
        assert!(partition.undecided.is_empty());
        assert_eq!(partition.dropped.len(), 3);
        assert_eq!(partition.report.orphaned_slots.len(), 1);
        assert_eq!(partition.report.orphaned_slots[0].kept, "M9");
        assert_eq!(
            partition.report.orphaned_slots[0].candidates,
            vec!["M1", "M2", "M3"]
        );
    }

    #[test]
    fn test_undecided_slot_offers_candidates_and_plain_rows_pass() {
        let config = InstituteConfig::default();
        let mut rows = homonym_rows(&["M3", "M1"]);
        let mut plain = row(2, "2024_011", "Martin, A.", Doi::Unknown);
        plain.matricule = "M7".to_string();
        rows.push(plain);
        let slice = slice(rows);

        let partition = CarryForwardEngine::new(&config).resolve_homonyms(
            &slice,
            &HashLookup::new(),
            &HistoryStore::new(),
        );

        assert_eq!(partition.undecided.len(), 2);
        assert!(partition
            .undecided
            .iter()
            .all(|u| u.choices == vec!["M1".to_string(), "M3".to_string()]));
        assert_eq!(partition.resolved.len(), 1);
        assert_eq!(partition.resolved[0].value, "M7");
        assert_eq!(partition.resolved[0].origin, Origin::AlreadyResolved);
    }

    #[test]
    fn test_homonym_decision_is_scoped_to_author_slot() {
        let config = InstituteConfig::default();
        let mut lookup = HashLookup::new();
        lookup.insert("2024_010", hash("H1"));
        let mut history = HistoryStore::new();
        history.record(HistoryKey::homonym(hash("H1"), 0), "M1");

        let mut rows = homonym_rows(&["M1", "M2"]);
        let mut other_slot = homonym_rows(&["M1", "M2"]);
        for (i, r) in other_slot.iter_mut().enumerate() {
            r.author_idx = 5;
            r.position = 10 + i;
        }
        rows.extend(other_slot);

        let partition = CarryForwardEngine::new(&config).resolve_homonyms(
            &slice(rows),
            &lookup,
            &history,
        );
        assert_eq!(partition.resolved.len(), 1);
        assert_eq!(partition.dropped.len(), 1);
        assert_eq!(partition.undecided.len(), 2);
        assert!(partition.undecided.iter().all(|u| u.row.author_idx == 5));
    }

    #[test]
    fn test_split_by_department_keeps_source_order() {
        let mut a = row(0, "2024_001", "X", Doi::Unknown);
        a.unit.department = "DES".to_string();
        let b = row(1, "2024_002", "Y", Doi::Unknown);
        let mut c = row(2, "2024_003", "Z", Doi::Unknown);
        c.unit.department = "DES".to_string();

        let slices = split_by_department(vec![a, b, c]);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].department, "DEN");
        assert_eq!(slices[1].department, "DES");
        let positions: Vec<usize> = slices[1].rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 2]);
    }
}
