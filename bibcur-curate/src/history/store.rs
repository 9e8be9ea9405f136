//! In-memory resolution history
//!
//! Append-only log of decisions with one live entry per key. Appending a key
//! again with the same canonical value is a no-op. A different value replaces
//! the live one only when it was recorded later (equal timestamps keep the
//! larger canonical value), so merging stores gives the same result in any
//! order. Every disagreement is recorded as a [`KeyConflict`].
//!
//! OTP keys carry the department: allowed tags differ per department, so one
//! publication may hold a different tag in each.

use bibcur_common::{canonical_value, Attribute, Doi, StableHash};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Natural key of one decision
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryKey {
    /// Stable hash of the publication. OTP decisions are qualified by the
    /// department, homonym decisions by the author position they settle.
    Primary {
        attribute: Attribute,
        hash: StableHash,
        department: Option<String>,
        author_idx: Option<u32>,
    },
    /// OTP decision for a publication without a stable hash
    Secondary {
        department: String,
        doi: Doi,
        author: String,
    },
}

impl HistoryKey {
    pub fn otp(department: &str, hash: StableHash) -> Self {
        HistoryKey::Primary {
            attribute: Attribute::Otp,
            hash,
            department: Some(department.trim().to_string()),
            author_idx: None,
        }
    }

    pub fn homonym(hash: StableHash, author_idx: u32) -> Self {
        HistoryKey::Primary {
            attribute: Attribute::Homonym,
            hash,
            department: None,
            author_idx: Some(author_idx),
        }
    }

    /// Secondary key; the author name has its whitespace collapsed
    pub fn secondary(department: &str, doi: Doi, author: &str) -> Self {
        HistoryKey::Secondary {
            department: department.trim().to_string(),
            doi,
            author: normalize_author(author),
        }
    }

    pub fn attribute(&self) -> Attribute {
        match self {
            HistoryKey::Primary { attribute, .. } => *attribute,
            HistoryKey::Secondary { .. } => Attribute::Otp,
        }
    }

    pub fn department(&self) -> Option<&str> {
        match self {
            HistoryKey::Primary { department, .. } => department.as_deref(),
            HistoryKey::Secondary { department, .. } => Some(department),
        }
    }

    /// Unique text form, used as the storage primary key
    pub fn storage_key(&self) -> String {
        match self {
            HistoryKey::Primary {
                attribute,
                hash,
                department,
                author_idx,
            } => {
                let mut key = format!("{}\u{1f}hash\u{1f}{}", attribute, hash);
                if let Some(department) = department {
                    key.push_str(&format!("\u{1f}dept\u{1f}{}", department));
                }
                if let Some(idx) = author_idx {
                    key.push_str(&format!("\u{1f}author\u{1f}{}", idx));
                }
                key
            }
            HistoryKey::Secondary {
                department,
                doi: Doi::Known(doi),
                author,
            } => format!("otp\u{1f}doi\u{1f}{}\u{1f}{}\u{1f}{}", department, doi, author),
            HistoryKey::Secondary {
                department,
                doi: Doi::Unknown,
                author,
            } => format!("otp\u{1f}author\u{1f}{}\u{1f}{}", department, author),
        }
    }
}

impl fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryKey::Primary {
                attribute,
                hash,
                department,
                author_idx,
            } => {
                write!(f, "{} hash={}", attribute, hash)?;
                if let Some(department) = department {
                    write!(f, " dept={}", department)?;
                }
                if let Some(idx) = author_idx {
                    write!(f, " author#{}", idx)?;
                }
                Ok(())
            }
            HistoryKey::Secondary {
                department,
                doi: Doi::Known(doi),
                author,
            } => write!(f, "otp dept={} doi={} author={}", department, doi, author),
            HistoryKey::Secondary {
                department, author, ..
            } => write!(f, "otp dept={} doi=unknown author={}", department, author),
        }
    }
}

/// Author names match exactly, modulo surrounding and repeated whitespace
pub fn normalize_author(author: &str) -> String {
    author.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One recorded decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub key: HistoryKey,
    /// Canonical string form of the decision
    pub value: String,
    /// Append order; larger is more recent
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Two canonical values recorded for one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyConflict {
    pub key: HistoryKey,
    /// Value live after the append
    pub kept: String,
    pub discarded: String,
}

/// Effect of one append
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    Unchanged,
    /// The incoming value was newer and replaced `previous`
    Replaced { previous: String },
    /// The live value was newer; the incoming one was discarded
    Superseded { current: String },
}

/// Counters returned by [`HistoryStore::merge`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub unchanged: usize,
    pub replaced: usize,
    pub superseded: usize,
}

/// Deduplicated decision history
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    index: HashMap<HistoryKey, usize>,
    /// (department, known DOI) → secondary entries recorded under it
    doi_index: HashMap<(String, String), Vec<usize>>,
    next_seq: u64,
    conflicts: Vec<KeyConflict>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision now
    pub fn record(&mut self, key: HistoryKey, value: &str) -> AppendOutcome {
        self.append(key, value, Utc::now())
    }

    /// Append a decision with its original timestamp
    pub fn append(
        &mut self,
        key: HistoryKey,
        value: &str,
        recorded_at: DateTime<Utc>,
    ) -> AppendOutcome {
        let value = canonical_value(value);
        let seq = self.next_seq;

        if let Some(&pos) = self.index.get(&key) {
            let entry = &mut self.entries[pos];
            if entry.value == value {
                if recorded_at > entry.recorded_at {
                    entry.recorded_at = recorded_at;
                }
                return AppendOutcome::Unchanged;
            }

            let incoming_wins =
                (recorded_at, value.as_str()) > (entry.recorded_at, entry.value.as_str());
            warn!(
                key = %entry.key,
                live = %entry.value,
                incoming = %value,
                incoming_wins,
                "History key recorded with two values; keeping the most recent"
            );

            if incoming_wins {
                let previous = std::mem::replace(&mut entry.value, value.clone());
                entry.seq = seq;
                entry.recorded_at = recorded_at;
                self.next_seq += 1;
                self.conflicts.push(KeyConflict {
                    key,
                    kept: value,
                    discarded: previous.clone(),
                });
                return AppendOutcome::Replaced { previous };
            }

            let current = entry.value.clone();
            self.conflicts.push(KeyConflict {
                key,
                kept: current.clone(),
                discarded: value,
            });
            return AppendOutcome::Superseded { current };
        }

        let pos = self.entries.len();
        if let HistoryKey::Secondary {
            department,
            doi: Doi::Known(doi),
            ..
        } = &key
        {
            self.doi_index
                .entry((department.clone(), doi.clone()))
                .or_default()
                .push(pos);
        }
        self.index.insert(key.clone(), pos);
        self.entries.push(HistoryEntry {
            key,
            value,
            seq,
            recorded_at,
        });
        self.next_seq += 1;
        AppendOutcome::Inserted
    }

    /// Fold `other` into `self`
    ///
    /// Idempotent and commutative: the newest value of each key wins
    /// whichever store is merged into which.
    pub fn merge(&mut self, other: &HistoryStore) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for entry in other.entries_by_seq() {
            match self.append(entry.key.clone(), &entry.value, entry.recorded_at) {
                AppendOutcome::Inserted => summary.inserted += 1,
                AppendOutcome::Unchanged => summary.unchanged += 1,
                AppendOutcome::Replaced { .. } => summary.replaced += 1,
                AppendOutcome::Superseded { .. } => summary.superseded += 1,
            }
        }
        tracing::info!(
            inserted = summary.inserted,
            unchanged = summary.unchanged,
            replaced = summary.replaced,
            superseded = summary.superseded,
            "History merged"
        );
        summary
    }

    pub fn get(&self, key: &HistoryKey) -> Option<&HistoryEntry> {
        self.index.get(key).map(|&pos| &self.entries[pos])
    }

    /// OTP decision recorded for a publication hash in one department
    pub fn otp_for_hash(&self, department: &str, hash: &StableHash) -> Option<&HistoryEntry> {
        self.get(&HistoryKey::otp(department, hash.clone()))
    }

    /// Kept matricule recorded for one author slot of a publication
    pub fn homonym_for_slot(&self, hash: &StableHash, author_idx: u32) -> Option<&HistoryEntry> {
        self.get(&HistoryKey::homonym(hash.clone(), author_idx))
    }

    /// Every secondary entry recorded under a known DOI in one department,
    /// oldest first
    pub fn secondary_for_doi(&self, department: &str, doi: &str) -> Vec<&HistoryEntry> {
        let mut found: Vec<&HistoryEntry> = self
            .doi_index
            .get(&(department.to_string(), doi.to_string()))
            .map(|positions| positions.iter().map(|&pos| &self.entries[pos]).collect())
            .unwrap_or_default();
        found.sort_by_key(|e| (e.recorded_at, e.seq));
        found
    }

    /// Secondary entry for an author under the unknown-DOI sentinel
    pub fn secondary_for_author(&self, department: &str, author: &str) -> Option<&HistoryEntry> {
        self.get(&HistoryKey::secondary(department, Doi::Unknown, author))
    }

    /// Live entries in insertion order
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Live entries ordered by append sequence
    pub fn entries_by_seq(&self) -> Vec<&HistoryEntry> {
        let mut entries: Vec<&HistoryEntry> = self.entries.iter().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of live entries per attribute
    pub fn count(&self, attribute: Attribute) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key.attribute() == attribute)
            .count()
    }

    /// Conflicts seen since creation
    pub fn conflicts(&self) -> &[KeyConflict] {
        &self.conflicts
    }

    /// Same key set and values, ignoring timestamps and sequence numbers
    pub fn same_decisions(&self, other: &HistoryStore) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|e| other.get(&e.key).map(|o| o.value == e.value).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hash(s: &str) -> StableHash {
        StableHash::new(s).unwrap()
    }

    fn at(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
    }

    fn sample() -> HistoryStore {
        let mut store = HistoryStore::new();
        store.record(HistoryKey::otp("DEN", hash("H1")), "A");
        store.record(HistoryKey::homonym(hash("H2"), 1), "M2");
        store.record(
            HistoryKey::secondary("DEN", Doi::Known("10.1/x".into()), "Dupont, J."),
            "B",
        );
        store.record(HistoryKey::secondary("DEN", Doi::Unknown, "Martin,  A."), "C");
        store
    }

    #[test]
    fn test_merge_with_itself_is_identity() {
        let mut store = sample();
        let copy = store.clone();
        let summary = store.merge(&copy);

        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.replaced, 0);
        assert_eq!(summary.unchanged, 4);
        assert_eq!(store.len(), 4);
        assert!(store.same_decisions(&copy));
        assert!(store.conflicts().is_empty());
    }

    #[test]
    fn test_canonical_values_do_not_conflict() {
        let mut store = HistoryStore::new();
        store.record(HistoryKey::homonym(hash("H2"), 0), "123456");
        let outcome = store.record(HistoryKey::homonym(hash("H2"), 0), " 123456.0 ");
        assert_eq!(outcome, AppendOutcome::Unchanged);
        assert!(store.conflicts().is_empty());
    }

    #[test]
    fn test_newer_value_replaces_and_is_reported() {
        let mut store = HistoryStore::new();
        let key = HistoryKey::otp("DEN", hash("H1"));
        store.append(key.clone(), "A", at(2023));
        let outcome = store.append(key.clone(), "B", at(2025));

        assert_eq!(outcome, AppendOutcome::Replaced { previous: "A".into() });
        assert_eq!(store.len(), 1);
        assert_eq!(store.otp_for_hash("DEN", &hash("H1")).unwrap().value, "B");
        assert_eq!(
            store.conflicts(),
            &[KeyConflict {
                key,
                kept: "B".into(),
                discarded: "A".into(),
            }]
        );
    }

    #[test]
    fn test_older_value_does_not_replace_newer_one() {
        let mut store = HistoryStore::new();
        let key = HistoryKey::otp("DEN", hash("H1"));
        store.append(key.clone(), "B", at(2025));
        let outcome = store.append(key.clone(), "A", at(2023));

        assert_eq!(outcome, AppendOutcome::Superseded { current: "B".into() });
        assert_eq!(store.get(&key).unwrap().value, "B");
        assert_eq!(store.conflicts().len(), 1);
        assert_eq!(store.conflicts()[0].discarded, "A");
    }

    #[test]
    fn test_conflicting_merge_is_commutative() {
        let mut a = HistoryStore::new();
        a.append(HistoryKey::otp("DEN", hash("H1")), "A", at(2023));
        a.append(HistoryKey::otp("DEN", hash("H2")), "X", at(2024));
        let mut b = HistoryStore::new();
        b.append(HistoryKey::otp("DEN", hash("H1")), "B", at(2025));
        b.append(HistoryKey::otp("DEN", hash("H2")), "Y", at(2024));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        assert!(ab.same_decisions(&ba));
        assert_eq!(ab.otp_for_hash("DEN", &hash("H1")).unwrap().value, "B");
        // Same timestamp: the larger canonical value wins on both sides
        assert_eq!(ab.otp_for_hash("DEN", &hash("H2")).unwrap().value, "Y");
        assert_eq!(ba.otp_for_hash("DEN", &hash("H2")).unwrap().value, "Y");
    }

    #[test]
    fn test_merge_is_commutative_on_disjoint_and_overlapping_keys() {
        let mut a = HistoryStore::new();
        a.record(HistoryKey::otp("DEN", hash("H1")), "A");
        a.record(HistoryKey::otp("DEN", hash("H2")), "B");
        let mut b = HistoryStore::new();
        b.record(HistoryKey::otp("DEN", hash("H2")), "B");
        b.record(HistoryKey::otp("DEN", hash("H3")), "C");

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        assert!(ab.same_decisions(&ba));
        assert_eq!(ab.len(), 3);
    }

    #[test]
    fn test_otp_decisions_are_kept_per_department() {
        let mut store = HistoryStore::new();
        store.record(HistoryKey::otp("DEN", hash("H1")), "A");
        store.record(HistoryKey::otp("DES", hash("H1")), "B");

        assert!(store.conflicts().is_empty());
        assert_eq!(store.otp_for_hash("DEN", &hash("H1")).unwrap().value, "A");
        assert_eq!(store.otp_for_hash("DES", &hash("H1")).unwrap().value, "B");
        assert!(store.otp_for_hash("DIR", &hash("H1")).is_none());
    }

    #[test]
    fn test_secondary_lookups() {
        let store = sample();
        let by_doi = store.secondary_for_doi("DEN", "10.1/x");
        assert_eq!(by_doi.len(), 1);
        assert_eq!(by_doi[0].value, "B");
        assert!(store.secondary_for_doi("DES", "10.1/x").is_empty());

        let by_author = store.secondary_for_author("DEN", "Martin, A.").unwrap();
        assert_eq!(by_author.value, "C");
        assert!(store.secondary_for_author("DEN", "Dupont, J.").is_none());
        assert!(store.secondary_for_author("DES", "Martin, A.").is_none());
    }

    #[test]
    fn test_storage_keys_are_distinct() {
        let keys = [
            HistoryKey::otp("DEN", hash("H1")),
            HistoryKey::otp("DES", hash("H1")),
            HistoryKey::homonym(hash("H1"), 0),
            HistoryKey::homonym(hash("H1"), 1),
            HistoryKey::secondary("DEN", Doi::Known("h1".into()), "X"),
            HistoryKey::secondary("DES", Doi::Known("h1".into()), "X"),
            HistoryKey::secondary("DEN", Doi::Unknown, "X"),
        ];
        let unique: std::collections::HashSet<String> =
            keys.iter().map(HistoryKey::storage_key).collect();
        assert_eq!(unique.len(), keys.len());
    }
}
