//! Error types for the application service.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors caused by what the user declared rather than by the system.
    /// These are surfaced in conditions but never counted as failures.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Validation(_) | Error::Authentication(_)
        )
    }

    /// Errors worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
