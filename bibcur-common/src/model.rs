//! Shared domain types
//!
//! Publications and attribution rows are rebuilt every run; only the stable
//! hash survives from one run to the next.

use crate::config::{full_unit, InstituteConfig};
use crate::table::RawTable;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Attribute a human decides on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Thematic classification tag
    Otp,
    /// Which employee record to keep among look-alikes
    Homonym,
}

impl Attribute {
    pub const ALL: [Attribute; 2] = [Attribute::Otp, Attribute::Homonym];

    pub fn as_str(self) -> &'static str {
        match self {
            Attribute::Otp => "otp",
            Attribute::Homonym => "homonym",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content-derived publication identifier, invariant across runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableHash(String);

impl StableHash {
    /// Wrap an upstream identifier; `None` for blank cells
    pub fn new(raw: &str) -> Option<Self> {
        let value = canonical_value(raw);
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Derive an identifier from content fields
    ///
    /// Title is case-folded with whitespace collapsed so that re-extraction
    /// noise does not change the result.
    pub fn from_fields(title: &str, doi: &str, year: &str) -> Self {
        let title = title
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(doi.trim().to_lowercase().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(year.trim().as_bytes());
        let digest = hasher.finalize();
        Self(format!("{:x}", digest)[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Publication DOI, or the "unknown" sentinel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Doi {
    Known(String),
    Unknown,
}

impl Doi {
    /// DOIs are case-insensitive; the known form is trimmed and lowercased
    pub fn parse(raw: &str, config: &InstituteConfig) -> Self {
        if config.is_unknown_doi(raw) {
            Doi::Unknown
        } else {
            Doi::Known(raw.trim().to_lowercase())
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Doi::Unknown)
    }

    /// Text form used in tables and storage
    pub fn to_cell(&self, config: &InstituteConfig) -> String {
        match self {
            Doi::Known(doi) => doi.clone(),
            Doi::Unknown => config.unknown_doi.clone(),
        }
    }
}

/// Department and laboratory an attribution belongs to
///
/// Always normalized: the laboratory is a real laboratory name or a
/// `(full-<unit>)` pseudo-laboratory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitPath {
    pub department: String,
    pub laboratory: String,
}

impl UnitPath {
    /// Apply the directorate and missing-laboratory aliasing rules
    pub fn normalize(department: &str, laboratory: &str, config: &InstituteConfig) -> Self {
        let department = department.trim();
        if config.is_directorate_label(department) {
            return Self {
                department: config.directorate_unit.clone(),
                laboratory: full_unit(&config.directorate_unit),
            };
        }
        let laboratory = if config.is_missing(laboratory) || config.is_directorate_label(laboratory)
        {
            full_unit(department)
        } else {
            laboratory.trim().to_string()
        };
        Self {
            department: department.to_string(),
            laboratory,
        }
    }
}

impl fmt::Display for UnitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.department, self.laboratory)
    }
}

/// One (publication, author position) row of the current run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionRow {
    /// Row order in the source table
    pub position: usize,
    /// Per-run sequential publication id
    pub pub_id: String,
    pub author_idx: u32,
    pub first_author: String,
    pub doi: Doi,
    pub matricule: String,
    pub unit: UnitPath,
    /// More than one employee record matches the printed name
    pub homonym: bool,
    /// Tag already present in the input, if any
    pub otp: Option<String>,
}

/// Canonical string form used for every comparison of stored values
///
/// Spreadsheet round-trips turn `"1234"` into `1234.0`; integral decimals are
/// written back as integers. Leading zeros are kept.
pub fn canonical_value(raw: &str) -> String {
    let value = raw.trim();
    if let Some((int, frac)) = value.split_once('.') {
        let (sign, digits) = match int.strip_prefix('-') {
            Some(digits) => ("-", digits),
            None => ("", int),
        };
        if !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
            && !frac.is_empty()
            && frac.bytes().all(|b| b == b'0')
        {
            return format!("{}{}", sign, digits);
        }
    }
    value.to_string()
}

/// Publication id to stable hash lookup for one corpus-year
#[derive(Debug, Clone, Default)]
pub struct HashLookup {
    by_pub: HashMap<String, StableHash>,
}

impl HashLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pub_id: &str, hash: StableHash) {
        self.by_pub.insert(canonical_value(pub_id), hash);
    }

    pub fn get(&self, pub_id: &str) -> Option<&StableHash> {
        self.by_pub.get(&canonical_value(pub_id))
    }

    pub fn len(&self) -> usize {
        self.by_pub.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pub.is_empty()
    }

    /// Build from the upstream lookup table; blank hashes are skipped
    pub fn from_table(table: &RawTable, config: &InstituteConfig) -> Result<Self> {
        let columns = &config.hash_columns;
        let idx = table.require_columns(&[columns.pub_id.as_str(), columns.hash.as_str()])?;
        let mut lookup = Self::new();
        for row in 0..table.len() {
            let pub_id = table.cell(row, idx[0]);
            if pub_id.trim().is_empty() {
                continue;
            }
            if let Some(hash) = StableHash::new(table.cell(row, idx[1])) {
                if let Some(previous) = lookup.get(pub_id) {
                    if previous != &hash {
                        return Err(Error::InvalidInput(format!(
                            "publication {} maps to two hashes ({} and {})",
                            pub_id, previous, hash
                        )));
                    }
                }
                lookup.insert(pub_id, hash);
            }
        }
        Ok(lookup)
    }
}
