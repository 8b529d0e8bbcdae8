//! Store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    /// The write lost an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for has_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => has_core::Error::NotFound(msg),
            StoreError::AlreadyExists(msg) | StoreError::Conflict(msg) => {
                has_core::Error::Conflict(msg)
            }
            StoreError::Invalid(msg) => has_core::Error::Validation(msg),
            StoreError::Serialization(e) => has_core::Error::Internal(e.to_string()),
            StoreError::Kube(e) => has_core::Error::Transient(e.to_string()),
        }
    }
}
