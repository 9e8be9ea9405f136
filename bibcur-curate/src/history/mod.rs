//! Resolution history
//!
//! - `store` - in-memory, deduplicated decision log with primary and
//!   secondary indexes
//! - `db` - SQLite persistence
//! - `table_io` - import/export of legacy history spreadsheets

pub mod db;
pub mod store;
pub mod table_io;

pub use db::{load_history, save_history};
pub use store::{
    normalize_author, AppendOutcome, HistoryEntry, HistoryKey, HistoryStore, KeyConflict,
    MergeSummary,
};
pub use table_io::{history_from_table, history_to_table};
