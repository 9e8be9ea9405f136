//! Unit artifacts
//!
//! - `assembly` - partition to ordered, human-editable rows
//! - `extraction` - edited rows back to history entries
//! - `columns` - column layout per attribute

pub mod assembly;
pub mod columns;
pub mod extraction;

pub use assembly::{assemble, ArtifactLine, UnitArtifact, ValueCell};
pub use columns::Column;
pub use extraction::{extract_decisions, Extraction, RejectedCell};
