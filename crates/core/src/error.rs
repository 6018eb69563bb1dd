//! Stable, wire-level error taxonomy for the operational core.
//!
//! Every variant maps to a machine-readable `code()` that crosses the HTTP
//! boundary unchanged (see `dispatch-api`), while the `Display` message
//! stays an internal implementation detail a caller may localize.

use thiserror::Error;

/// Error surfaced by any core trait (`JobQueue`, `HeartbeatRegistry`,
/// the relational stores) or the policy/incident pure functions.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("queue backend unavailable: {0}")]
    QueueUnavailable(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// The stable, machine-readable code surfaced at the HTTP boundary.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::UnknownJobType(_) => "VALIDATION_ERROR",
            CoreError::Other(_) => "UNKNOWN",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
