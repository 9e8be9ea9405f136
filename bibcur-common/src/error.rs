//! Common error types for bibcur

use thiserror::Error;

/// Common result type for bibcur operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across bibcur crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error (wraps csv::Error)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required column is absent from an input table
    ///
    /// Raised before any output is produced so a run never works from a
    /// partially understood table.
    #[error("Configuration error: table '{table}' is missing required column(s): {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    /// Invalid input value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors that must abort a run before any output is written
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Config(_) | Error::MissingColumns { .. })
    }
}
