//! History exchange as a plain table
//!
//! Lets decisions kept in spreadsheets by earlier campaigns be imported, and
//! the live history be exported for review.

use super::store::{HistoryKey, HistoryStore};
use bibcur_common::{Attribute, Doi, Error, InstituteConfig, RawTable, Result, StableHash};
use chrono::{DateTime, Utc};

pub const COL_ATTRIBUTE: &str = "Attribute";
pub const COL_DEPARTMENT: &str = "Department";
pub const COL_HASH: &str = "Hash_id";
pub const COL_AUTHOR_IDX: &str = "Idx_author";
pub const COL_DOI: &str = "DOI";
pub const COL_AUTHOR: &str = "First_author";
pub const COL_VALUE: &str = "Value";
pub const COL_RECORDED_AT: &str = "Recorded_at";

const HEADERS: [&str; 8] = [
    COL_ATTRIBUTE,
    COL_DEPARTMENT,
    COL_HASH,
    COL_AUTHOR_IDX,
    COL_DOI,
    COL_AUTHOR,
    COL_VALUE,
    COL_RECORDED_AT,
];

/// One row per live entry, oldest first
pub fn history_to_table(store: &HistoryStore, config: &InstituteConfig) -> RawTable {
    let mut table = RawTable::new(
        "resolution_history",
        HEADERS.iter().map(|h| h.to_string()).collect(),
    );
    for entry in store.entries_by_seq() {
        let (hash, author_idx, doi, author) = match &entry.key {
            HistoryKey::Primary {
                hash, author_idx, ..
            } => (
                hash.to_string(),
                author_idx.map(|i| i.to_string()).unwrap_or_default(),
                String::new(),
                String::new(),
            ),
            HistoryKey::Secondary { doi, author, .. } => (
                String::new(),
                String::new(),
                doi.to_cell(config),
                author.clone(),
            ),
        };
        table.push_row(vec![
            entry.key.attribute().to_string(),
            entry.key.department().unwrap_or_default().to_string(),
            hash,
            author_idx,
            doi,
            author,
            entry.value.clone(),
            entry.recorded_at.to_rfc3339(),
        ]);
    }
    table
}

/// Replay a history table into a new store
///
/// A row with a hash becomes a primary entry; otherwise DOI and author form
/// the secondary key. OTP rows must name their department. Rows without a
/// readable timestamp count as the oldest possible, so they never override a
/// dated decision; duplicates among them resolve to the larger value and are
/// reported as conflicts.
pub fn history_from_table(table: &RawTable, config: &InstituteConfig) -> Result<HistoryStore> {
    let idx = table.require_columns(&[
        COL_ATTRIBUTE,
        COL_DEPARTMENT,
        COL_HASH,
        COL_DOI,
        COL_AUTHOR,
        COL_VALUE,
    ])?;
    let author_idx_col = table.column_index(COL_AUTHOR_IDX);
    let recorded_col = table.column_index(COL_RECORDED_AT);

    let mut store = HistoryStore::new();
    for row in 0..table.len() {
        let line = row + 2;
        let attribute = Attribute::parse(table.cell(row, idx[0])).ok_or_else(|| {
            Error::InvalidInput(format!(
                "{}: row {} has unknown attribute '{}'",
                table.name(),
                line,
                table.cell(row, idx[0])
            ))
        })?;
        let value = table.cell(row, idx[5]).trim();
        if value.is_empty() {
            continue;
        }

        let department = table.cell(row, idx[1]).trim();
        if attribute == Attribute::Otp && department.is_empty() {
            return Err(Error::InvalidInput(format!(
                "{}: row {} OTP decision has no department",
                table.name(),
                line
            )));
        }

        let key = match StableHash::new(table.cell(row, idx[2])) {
            Some(hash) => match attribute {
                Attribute::Otp => HistoryKey::otp(department, hash),
                Attribute::Homonym => {
                    let cell = author_idx_col.map(|c| table.cell(row, c)).unwrap_or("");
                    let author_idx = bibcur_common::canonical_value(cell)
                        .parse::<u32>()
                        .map_err(|_| {
                            Error::InvalidInput(format!(
                                "{}: row {} homonym decision needs an author position",
                                table.name(),
                                line
                            ))
                        })?;
                    HistoryKey::homonym(hash, author_idx)
                }
            },
            None => {
                if attribute == Attribute::Homonym {
                    return Err(Error::InvalidInput(format!(
                        "{}: row {} homonym decision has no hash",
                        table.name(),
                        line
                    )));
                }
                let author = table.cell(row, idx[4]);
                if author.trim().is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "{}: row {} has neither hash nor author",
                        table.name(),
                        line
                    )));
                }
                HistoryKey::secondary(
                    department,
                    Doi::parse(table.cell(row, idx[3]), config),
                    author,
                )
            }
        };

        let recorded_at = recorded_col
            .and_then(|c| DateTime::parse_from_rfc3339(table.cell(row, c).trim()).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        store.append(key, value, recorded_at);
    }
    Ok(store)
}
