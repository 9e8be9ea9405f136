//! Primary-key tier
//!
//! Decisions keyed by the publication's stable hash. OTP decisions apply to
//! every row of the publication within the row's department; homonym
//! decisions apply to one author slot.

use super::{CarryForwardTier, Tier, TierHit};
use crate::history::{HistoryEntry, HistoryStore};
use bibcur_common::{AttributionRow, HashLookup};

pub struct PrimaryTier<'a> {
    lookup: &'a HashLookup,
    history: &'a HistoryStore,
}

impl<'a> PrimaryTier<'a> {
    pub fn new(lookup: &'a HashLookup, history: &'a HistoryStore) -> Self {
        Self { lookup, history }
    }

    /// Kept matricule for the author slot `(pub_id, author_idx)`
    pub fn homonym_slot(&self, pub_id: &str, author_idx: u32) -> Option<&'a HistoryEntry> {
        let hash = self.lookup.get(pub_id)?;
        self.history.homonym_for_slot(hash, author_idx)
    }
}

impl<'a> CarryForwardTier<'a> for PrimaryTier<'a> {
    fn tier(&self) -> Tier {
        Tier::Primary
    }

    fn find(&self, row: &AttributionRow) -> Option<TierHit<'a>> {
        let hash = self.lookup.get(&row.pub_id)?;
        self.history
            .otp_for_hash(&row.unit.department, hash)
            .map(TierHit::single)
    }
}
