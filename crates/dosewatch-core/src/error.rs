//! Error taxonomy for core operations.

use thiserror::Error;

use crate::db::DbError;

/// Errors returned by core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed input; not retried.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Permission gate rejection.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Transition out of a terminal state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No units left to record a taken dose.
    #[error("Insufficient stock for prescription {0}")]
    InsufficientStock(String),

    /// Concurrent duplicate insert; callers treat this as a skip.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Classifier or delivery provider failed; recoverable.
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Database(DbError::Sqlite(e))
    }
}

impl CoreError {
    /// Whether a retry of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::CollaboratorUnavailable(_) | CoreError::Conflict(_) | CoreError::Database(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
