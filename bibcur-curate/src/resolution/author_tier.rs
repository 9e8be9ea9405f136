//! Author-name tier (OTP only, unknown DOI)
//!
//! Only rows whose own first-author name matches an entry recorded under the
//! unknown-DOI sentinel are filled. Other authors in the same bucket stay
//! untouched.

use super::{CarryForwardTier, Tier, TierHit};
use crate::history::HistoryStore;
use bibcur_common::AttributionRow;

pub struct AuthorTier<'a> {
    history: &'a HistoryStore,
}

impl<'a> AuthorTier<'a> {
    pub fn new(history: &'a HistoryStore) -> Self {
        Self { history }
    }
}

impl<'a> CarryForwardTier<'a> for AuthorTier<'a> {
    fn tier(&self) -> Tier {
        Tier::Author
    }

    fn find(&self, row: &AttributionRow) -> Option<TierHit<'a>> {
        if !row.doi.is_unknown() {
            return None;
        }
        self.history
            .secondary_for_author(&row.unit.department, &row.first_author)
            .map(TierHit::single)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryKey;
    use bibcur_common::{Doi, UnitPath};

    fn row(author: &str, doi: Doi) -> AttributionRow {
        AttributionRow {
            position: 0,
            pub_id: "2024_001".to_string(),
            author_idx: 0,
            first_author: author.to_string(),
            doi,
            matricule: "1".to_string(),
            unit: UnitPath {
                department: "DEN".to_string(),
                laboratory: "LPEC".to_string(),
            },
            homonym: false,
            otp: None,
        }
    }

    #[test]
    fn test_only_matching_author_is_filled() {
        let mut history = HistoryStore::new();
        history.record(HistoryKey::secondary("DEN", Doi::Unknown, "Dupont, J."), "A");
        let tier = AuthorTier::new(&history);

        assert_eq!(tier.find(&row("Dupont,  J.", Doi::Unknown)).unwrap().entry.value, "A");
        assert!(tier.find(&row("Durand, P.", Doi::Unknown)).is_none());
    }

    #[test]
    fn test_known_doi_rows_are_not_matched_by_name() {
        let mut history = HistoryStore::new();
        history.record(HistoryKey::secondary("DEN", Doi::Unknown, "Dupont, J."), "A");
        let tier = AuthorTier::new(&history);
        assert!(tier.find(&row("Dupont, J.", Doi::Known("10.1/x".into()))).is_none());
    }
}
