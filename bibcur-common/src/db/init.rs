//! Database initialization
//!
//! The resolution history is the only state kept between runs. Table creation
//! is idempotent so every run may call [`init_database`].

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the history database and ensure its schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new history database: {}", db_path.display());
    } else {
        info!("Opened existing history database: {}", db_path.display());
    }

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_history_table(&pool).await?;
    Ok(pool)
}

/// In-memory database with the history schema, for tests and dry runs
///
/// Single connection: every pooled connection to `:memory:` would otherwise
/// see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_history_table(&pool).await?;
    Ok(pool)
}

/// Create the resolution_history table
///
/// `entry_key` is the serialized history key; one row per key. `department`
/// is set for OTP decisions and empty for homonym ones.
pub async fn create_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resolution_history (
            entry_key TEXT PRIMARY KEY,
            attribute TEXT NOT NULL,
            key_kind TEXT NOT NULL,
            department TEXT,
            hash TEXT,
            author_idx INTEGER,
            doi TEXT,
            author TEXT,
            value TEXT NOT NULL,
            seq INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_resolution_history_seq ON resolution_history(seq)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
