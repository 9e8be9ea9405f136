//! History persistence (SQLite)
//!
//! Rows are replayed through [`HistoryStore::append`] in sequence order on
//! load, so duplicate keys left by older tooling surface as conflicts instead
//! of being silently collapsed. Rows whose key or timestamp cannot be decoded
//! are skipped and counted.

use super::store::{HistoryKey, HistoryStore};
use bibcur_common::{Attribute, Doi, StableHash};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

const KIND_HASH: &str = "hash";
const KIND_DOI_AUTHOR: &str = "doi_author";

/// Load the full history
pub async fn load_history(pool: &SqlitePool) -> Result<HistoryStore, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT attribute, key_kind, department, hash, author_idx, doi, author, value, recorded_at
        FROM resolution_history
        ORDER BY seq ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut store = HistoryStore::new();
    let mut skipped = 0usize;
    for row in &rows {
        let attribute: String = row.try_get("attribute")?;
        let key_kind: String = row.try_get("key_kind")?;
        let department: Option<String> = row.try_get("department")?;
        let hash: Option<String> = row.try_get("hash")?;
        let author_idx: Option<i64> = row.try_get("author_idx")?;
        let doi: Option<String> = row.try_get("doi")?;
        let author: Option<String> = row.try_get("author")?;
        let value: String = row.try_get("value")?;
        let recorded_at: String = row.try_get("recorded_at")?;

        let Some(key) = decode_key(&attribute, &key_kind, department, hash, author_idx, doi, author)
        else {
            skipped += 1;
            continue;
        };
        let recorded_at = match DateTime::parse_from_rfc3339(&recorded_at) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                debug!(key = %key, error = %e, "Unreadable history timestamp");
                skipped += 1;
                continue;
            }
        };
        store.append(key, &value, recorded_at);
    }

    if skipped > 0 {
        warn!(skipped, "Unreadable history rows skipped");
    }
    info!(
        entries = store.len(),
        conflicts = store.conflicts().len(),
        "History loaded"
    );
    Ok(store)
}

/// Upsert every live entry in one transaction
///
/// Returns the number of rows written.
pub async fn save_history(pool: &SqlitePool, store: &HistoryStore) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for entry in store.entries_by_seq() {
        let (key_kind, hash, author_idx, doi, author) = match &entry.key {
            HistoryKey::Primary {
                hash, author_idx, ..
            } => (
                KIND_HASH,
                Some(hash.as_str().to_string()),
                author_idx.map(i64::from),
                None,
                None,
            ),
            HistoryKey::Secondary { doi, author, .. } => (
                KIND_DOI_AUTHOR,
                None,
                None,
                match doi {
                    Doi::Known(doi) => Some(doi.clone()),
                    Doi::Unknown => None,
                },
                Some(author.clone()),
            ),
        };

        sqlx::query(
            r#"
            INSERT INTO resolution_history
                (entry_key, attribute, key_kind, department, hash, author_idx, doi, author,
                 value, seq, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(entry_key) DO UPDATE SET
                value = excluded.value,
                seq = excluded.seq,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(entry.key.storage_key())
        .bind(entry.key.attribute().as_str())
        .bind(key_kind)
        .bind(entry.key.department())
        .bind(hash)
        .bind(author_idx)
        .bind(doi)
        .bind(author)
        .bind(&entry.value)
        .bind(entry.seq as i64)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        written += 1;
    }

    tx.commit().await?;
    debug!(written, "History saved");
    Ok(written)
}

fn decode_key(
    attribute: &str,
    key_kind: &str,
    department: Option<String>,
    hash: Option<String>,
    author_idx: Option<i64>,
    doi: Option<String>,
    author: Option<String>,
) -> Option<HistoryKey> {
    let attribute = Attribute::parse(attribute)?;
    let department = department.filter(|d| !d.trim().is_empty());
    match (key_kind, attribute) {
        (KIND_HASH, Attribute::Otp) => {
            Some(HistoryKey::otp(&department?, StableHash::new(&hash?)?))
        }
        (KIND_HASH, Attribute::Homonym) => {
            let author_idx = u32::try_from(author_idx?).ok()?;
            Some(HistoryKey::homonym(StableHash::new(&hash?)?, author_idx))
        }
        (KIND_DOI_AUTHOR, Attribute::Otp) => {
            let doi = match doi {
                Some(doi) if !doi.trim().is_empty() => Doi::Known(doi),
                _ => Doi::Unknown,
            };
            Some(HistoryKey::secondary(&department?, doi, &author?))
        }
        _ => None,
    }
}
