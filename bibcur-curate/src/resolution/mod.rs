//! Carry-forward resolution
//!
//! Re-applies recorded decisions to a freshly rebuilt set of rows, one
//! department at a time. OTP tiers are tried in priority order, and each one
//! only sees rows no earlier tier settled:
//! 1. `primary_tier` - stable hash of the publication
//! 2. `doi_tier` - known DOI
//! 3. `author_tier` - first-author name when the DOI is unknown
//!
//! Homonym decisions only exist in the primary tier. Rows no tier settles are
//! left undecided with their legal choices.

pub mod author_tier;
pub mod doi_tier;
pub mod engine;
pub mod primary_tier;
pub mod types;

pub use author_tier::AuthorTier;
pub use doi_tier::DoiTier;
pub use engine::{split_by_department, CarryForwardEngine};
pub use primary_tier::PrimaryTier;
pub use types::{
    AmbiguousDoi, DroppedRow, OrphanedSlot, Origin, Partition, ResolutionReport, ResolvedRow,
    StaleValue, Tier, TierCounts, UndecidedRow, UnitSlice,
};

use crate::history::HistoryEntry;
use bibcur_common::AttributionRow;

/// Entry found by a tier for one row
#[derive(Debug, Clone)]
pub struct TierHit<'a> {
    pub entry: &'a HistoryEntry,
    /// Set when the tier had to choose between disagreeing entries
    pub ambiguity: Option<AmbiguousDoi>,
}

impl<'a> TierHit<'a> {
    pub fn single(entry: &'a HistoryEntry) -> Self {
        Self {
            entry,
            ambiguity: None,
        }
    }
}

/// One OTP history lookup strategy
pub trait CarryForwardTier<'a> {
    fn tier(&self) -> Tier;

    /// Recorded decision applying to `row`, if any
    fn find(&self, row: &AttributionRow) -> Option<TierHit<'a>>;
}
