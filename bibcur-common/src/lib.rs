//! # bibcur Common Library
//!
//! Shared code for the bibliographic curation workspace:
//! - Error types
//! - Configuration loading (TOML bootstrap + institute parameters)
//! - Tabular exchange format (`RawTable`, CSV)
//! - Domain types (attribution rows, stable hashes, units)
//! - History database initialization

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod model;
pub mod table;

pub use config::InstituteConfig;
pub use error::{Error, Result};
pub use model::{canonical_value, Attribute, AttributionRow, Doi, HashLookup, StableHash, UnitPath};
pub use table::RawTable;
