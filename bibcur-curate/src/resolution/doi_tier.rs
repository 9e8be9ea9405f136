//! DOI tier (OTP only)
//!
//! Secondary entries recorded under a known DOI in the row's department. The
//! tag applies to every row of that department sharing the DOI, whichever
//! author recorded it. When authors of the same
//! DOI recorded different tags, the most recent one is applied and the DOI is
//! reported as ambiguous.

use super::{AmbiguousDoi, CarryForwardTier, Tier, TierHit};
use crate::history::HistoryStore;
use bibcur_common::{AttributionRow, Doi};

pub struct DoiTier<'a> {
    history: &'a HistoryStore,
}

impl<'a> DoiTier<'a> {
    pub fn new(history: &'a HistoryStore) -> Self {
        Self { history }
    }
}

impl<'a> CarryForwardTier<'a> for DoiTier<'a> {
    fn tier(&self) -> Tier {
        Tier::Doi
    }

    fn find(&self, row: &AttributionRow) -> Option<TierHit<'a>> {
        let doi = match &row.doi {
            Doi::Known(doi) => doi,
            Doi::Unknown => return None,
        };

        // Oldest first
        let entries = self.history.secondary_for_doi(&row.unit.department, doi);
        let latest = *entries.last()?;

        let mut values: Vec<String> = Vec::new();
        for entry in &entries {
            if !values.contains(&entry.value) {
                values.push(entry.value.clone());
            }
        }

        let ambiguity = if values.len() > 1 {
            Some(AmbiguousDoi {
                doi: doi.clone(),
                values,
                chosen: latest.value.clone(),
            })
        } else {
            None
        };

        Some(TierHit {
            entry: latest,
            ambiguity,
        })
    }
}
