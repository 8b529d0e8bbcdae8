//! Source access errors.

use has_devfile::DevfileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid repository URL: {0}")]
    InvalidUrl(String),

    #[error("unable to get default branch: {0}")]
    DefaultBranch(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response ({status}) from {url}")]
    Status { status: u16, url: String },

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Devfile(#[from] DevfileError),
}

impl SourceError {
    /// Failures that may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Request(_) | SourceError::Io(_) => true,
            SourceError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

impl From<SourceError> for has_core::Error {
    fn from(err: SourceError) -> Self {
        let message = err.to_string();
        match err {
            SourceError::NotFound(_) => has_core::Error::NotFound(message),
            SourceError::Unauthorized(_) => has_core::Error::Authentication(message),
            SourceError::InvalidUrl(_)
            | SourceError::DefaultBranch(_)
            | SourceError::Devfile(_) => has_core::Error::Validation(message),
            SourceError::Git { .. } => has_core::Error::Transient(message),
            ref other if other.is_transient() => has_core::Error::Transient(message),
            _ => has_core::Error::Internal(message),
        }
    }
}
