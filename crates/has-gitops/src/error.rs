//! GitOps generation errors.

use has_source::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitOpsError {
    #[error("unable to render resources: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Source(#[from] SourceError),
}

pub type GitOpsResult<T> = std::result::Result<T, GitOpsError>;

impl From<GitOpsError> for has_core::Error {
    fn from(err: GitOpsError) -> Self {
        match err {
            GitOpsError::Source(e) => e.into(),
            GitOpsError::Render(msg) => has_core::Error::Validation(msg),
            other => has_core::Error::Internal(other.to_string()),
        }
    }
}
