//! Resolution data types

use bibcur_common::{Attribute, AttributionRow};
use serde::Serialize;
use std::fmt;

/// Current rows of one department
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSlice {
    pub department: String,
    /// Rows in source order
    pub rows: Vec<AttributionRow>,
}

/// History tier that supplied a carried-forward value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Stable hash of the publication
    Primary,
    /// Known DOI
    Doi,
    /// First-author name under the unknown DOI
    Author,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::Doi => "doi",
            Tier::Author => "author",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "tier")]
pub enum Origin {
    /// The current row already carried a legal value
    AlreadyResolved,
    CarriedForward(Tier),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::AlreadyResolved => f.write_str("resolved"),
            Origin::CarriedForward(tier) => write!(f, "carried:{}", tier),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRow {
    pub row: AttributionRow,
    /// Tag or kept matricule
    pub value: String,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndecidedRow {
    pub row: AttributionRow,
    /// Legal choices offered to the human, never empty
    pub choices: Vec<String>,
}

/// Homonym candidate removed by a carried-forward decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedRow {
    pub row: AttributionRow,
    /// Matricule kept for the slot
    pub kept: String,
}

/// Outcome of one resolution pass over a [`UnitSlice`]
///
/// Every input row lands in exactly one of `resolved`, `undecided`, or
/// `dropped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub department: String,
    pub resolved: Vec<ResolvedRow>,
    pub undecided: Vec<UndecidedRow>,
    pub dropped: Vec<DroppedRow>,
    pub report: ResolutionReport,
}

impl Partition {
    pub(crate) fn new(department: &str, attribute: Attribute, rows: usize) -> Self {
        Self {
            department: department.to_string(),
            resolved: Vec::new(),
            undecided: Vec::new(),
            dropped: Vec::new(),
            report: ResolutionReport::new(department, attribute, rows),
        }
    }

    pub fn attribute(&self) -> Attribute {
        self.report.attribute
    }

    /// Number of rows accounted for
    pub fn len(&self) -> usize {
        self.resolved.len() + self.undecided.len() + self.dropped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn push_resolved(&mut self, row: AttributionRow, value: String, origin: Origin) {
        match origin {
            Origin::AlreadyResolved => self.report.already_resolved += 1,
            Origin::CarriedForward(Tier::Primary) => self.report.carried.primary += 1,
            Origin::CarriedForward(Tier::Doi) => self.report.carried.doi += 1,
            Origin::CarriedForward(Tier::Author) => self.report.carried.author += 1,
        }
        self.resolved.push(ResolvedRow { row, value, origin });
    }

    pub(crate) fn push_undecided(&mut self, row: AttributionRow, choices: Vec<String>) {
        self.report.undecided += 1;
        self.undecided.push(UndecidedRow { row, choices });
    }

    pub(crate) fn push_dropped(&mut self, row: AttributionRow, kept: &str) {
        self.report.dropped += 1;
        self.dropped.push(DroppedRow {
            row,
            kept: kept.to_string(),
        });
    }
}

/// Rows filled per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub primary: usize,
    pub doi: usize,
    pub author: usize,
}

impl TierCounts {
    pub fn total(&self) -> usize {
        self.primary + self.doi + self.author
    }
}

/// Carried value no longer in the row's vocabulary; the row was left undecided
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleValue {
    pub pub_id: String,
    pub author_idx: u32,
    pub value: String,
    /// `None` when the stale value came with the current row
    pub tier: Option<Tier>,
}

/// Homonym slot whose kept matricule is no longer among the candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedSlot {
    pub pub_id: String,
    pub author_idx: u32,
    pub kept: String,
    pub candidates: Vec<String>,
}

/// DOI with several distinct recorded tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousDoi {
    pub doi: String,
    /// Distinct values, oldest first
    pub values: Vec<String>,
    /// Most recently recorded value, the one applied
    pub chosen: String,
}

/// Non-fatal findings of one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub department: String,
    pub attribute: Attribute,
    pub rows: usize,
    pub already_resolved: usize,
    pub carried: TierCounts,
    pub undecided: usize,
    pub dropped: usize,
    pub stale: Vec<StaleValue>,
    pub orphaned_slots: Vec<OrphanedSlot>,
    pub ambiguous_dois: Vec<AmbiguousDoi>,
}

impl ResolutionReport {
    fn new(department: &str, attribute: Attribute, rows: usize) -> Self {
        Self {
            department: department.to_string(),
            attribute,
            rows,
            already_resolved: 0,
            carried: TierCounts::default(),
            undecided: 0,
            dropped: 0,
            stale: Vec::new(),
            orphaned_slots: Vec::new(),
            ambiguous_dois: Vec::new(),
        }
    }

    /// True when something needs a human look beyond the undecided rows
    pub fn has_warnings(&self) -> bool {
        !self.stale.is_empty() || !self.orphaned_slots.is_empty() || !self.ambiguous_dois.is_empty()
    }
}
