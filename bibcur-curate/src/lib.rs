//! bibcur-curate - carry-forward curation library
//!
//! Re-applies human curation decisions (OTP classification tags and homonym
//! choices) to publication records rebuilt on every reprocessing run.
//!
//! **Architecture:**
//! - `hierarchy` - allowed-tag lists per department and laboratory
//! - `history` - deduplicated decision log and its SQLite persistence
//! - `resolution` - tiered carry-forward engine
//! - `artifact` - per-department editable tables, both directions
//! - `workflow` - prepare/collect run pipeline

pub mod artifact;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod history;
pub mod records;
pub mod resolution;
pub mod workflow;

pub use error::{CurateError, CurateResult};
pub use hierarchy::{TagHierarchy, TagHierarchyBuilder};
pub use history::{HistoryKey, HistoryStore};
pub use resolution::{CarryForwardEngine, Partition, ResolutionReport};
pub use workflow::{CurationRun, PreparedRun, RunInputs};
