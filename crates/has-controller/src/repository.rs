//! GitOps repository management for Applications.

use async_trait::async_trait;
use has_source::{GitHubClient, SourceError};

/// Creates and deletes the GitOps repositories generated for Applications.
#[async_trait]
pub trait RepositoryManager: Send + Sync {
    /// Create `org/name` and return its URL. An existing repository with that
    /// name is returned as is.
    async fn create_repository(&self, org: &str, name: &str) -> has_core::Result<String>;

    /// Delete `owner/name`. Deleting a repository that is already gone succeeds.
    async fn delete_repository(&self, owner: &str, name: &str) -> has_core::Result<()>;
}

#[async_trait]
impl RepositoryManager for GitHubClient {
    async fn create_repository(&self, org: &str, name: &str) -> has_core::Result<String> {
        let repo = match self.get_repo(org, name).await {
            Ok(repo) => repo,
            Err(SourceError::NotFound(_)) => self.create_repo(org, name, false).await?,
            Err(e) => return Err(e.into()),
        };
        Ok(repo.html_url)
    }

    async fn delete_repository(&self, owner: &str, name: &str) -> has_core::Result<()> {
        Ok(self.delete_repo(owner, name).await?)
    }
}
