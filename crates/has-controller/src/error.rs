//! Reconcile errors.

use has_devfile::DevfileError;
use has_source::SourceError;
use has_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Core(#[from] has_core::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("devfile error: {0}")]
    Devfile(#[from] DevfileError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
    /// Lost an optimistic-concurrency race; retry with a fresh read.
    pub fn is_conflict(&self) -> bool {
        match self {
            ReconcileError::Core(e) => matches!(e, has_core::Error::Conflict(_)),
            ReconcileError::Store(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// Caused by what the user declared. Not counted as a failure.
    pub fn is_user_error(&self) -> bool {
        match self {
            ReconcileError::Core(e) => e.is_user_error(),
            ReconcileError::Store(_) => false,
            ReconcileError::Devfile(_) => true,
            ReconcileError::Source(e) => matches!(
                e,
                SourceError::InvalidUrl(_)
                    | SourceError::DefaultBranch(_)
                    | SourceError::NotFound(_)
                    | SourceError::Unauthorized(_)
                    | SourceError::Devfile(_)
            ),
        }
    }
}
