//! Operator configuration.

use std::time::Duration;

pub const DEFAULT_IMAGE_REGISTRY: &str = "quay.io/redhat-appstudio/user-workload";

/// Settings shared by every reconciler.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch. All namespaces when `None`.
    pub namespace: Option<String>,
    pub workers_per_kind: usize,
    /// Upper bound on repository analyses running at once.
    pub max_concurrent_analyses: usize,
    /// Reconciles tolerated without the referenced Application before the
    /// Component is marked as failed.
    pub application_missing_threshold: u32,
    pub application_missing_requeue: Duration,
    /// Failed external cleanups tolerated before a finalizer is removed anyway.
    pub finalize_retry_limit: u32,
    pub http_timeout: Duration,
    pub http_retry_attempts: u32,
    pub analyzer_retry_attempts: u32,
    pub analyzer_retry_backoff: Duration,
    /// How often a pending file content request is polled.
    pub file_request_poll: Duration,
    pub github_token: Option<String>,
    /// Organization in which Application GitOps repositories are generated.
    pub gitops_org: Option<String>,
    pub image_registry: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            workers_per_kind: 2,
            max_concurrent_analyses: 4,
            application_missing_threshold: 3,
            application_missing_requeue: Duration::from_secs(5),
            finalize_retry_limit: 5,
            http_timeout: Duration::from_secs(30),
            http_retry_attempts: 3,
            analyzer_retry_attempts: 3,
            analyzer_retry_backoff: Duration::from_secs(1),
            file_request_poll: Duration::from_secs(5),
            github_token: None,
            gitops_org: None,
            image_registry: DEFAULT_IMAGE_REGISTRY.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Application GitOps repositories are generated only with both an
    /// organization and a token.
    pub fn generates_gitops_repositories(&self) -> bool {
        self.gitops_org.as_deref().is_some_and(|o| !o.is_empty())
            && self.github_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}
