//! Error types for bibcur-curate
//!
//! Only conditions that stop a run are errors. Key ambiguity, stale carried
//! values, and unresolvable rows are reported as data (see
//! [`crate::resolution::ResolutionReport`] and [`crate::history::KeyConflict`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CurateError {
    /// Missing columns, bad institute parameters, unreadable config
    #[error(transparent)]
    Common(#[from] bibcur_common::Error),

    /// History persistence failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An edited artifact cannot be trusted as a source of decisions
    #[error("Artifact '{artifact}' rejected: {reason}")]
    ArtifactRejected { artifact: String, reason: String },

    /// A run stopped before producing output; nothing was merged
    #[error("Run aborted during {phase}: {source}")]
    RunAborted {
        phase: &'static str,
        #[source]
        source: Box<CurateError>,
    },
}

impl CurateError {
    /// Wrap an error with the run phase it interrupted
    pub fn aborted(phase: &'static str, source: impl Into<CurateError>) -> Self {
        CurateError::RunAborted {
            phase,
            source: Box::new(source.into()),
        }
    }

    /// True when the failure comes from configuration or table layout
    pub fn is_configuration(&self) -> bool {
        match self {
            CurateError::Common(e) => e.is_configuration(),
            CurateError::RunAborted { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}

pub type CurateResult<T> = Result<T, CurateError>;
