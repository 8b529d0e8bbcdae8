//! Shared reconciler context.

use has_core::ObjectKey;
use has_core::analyzer::Analyzer;
use has_core::api::{Application, Component, ComponentDetectionQuery, SPIFileContentRequest};
use has_core::gitops::GitOpsGenerator;
use has_source::SourceClient;
use has_store::{KubeStore, ResourceStore};
use k8s_openapi::api::core::v1::Secret;
use kube::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::OperatorConfig;
use crate::metrics::Metrics;
use crate::repository::RepositoryManager;

/// Secret keys holding a source-control token, in lookup order.
const TOKEN_KEYS: [&str; 2] = ["password", "token"];

/// Store per resource kind.
#[derive(Clone)]
pub struct Stores {
    pub applications: Arc<dyn ResourceStore<Application>>,
    pub components: Arc<dyn ResourceStore<Component>>,
    pub detections: Arc<dyn ResourceStore<ComponentDetectionQuery>>,
    pub file_requests: Arc<dyn ResourceStore<SPIFileContentRequest>>,
    pub secrets: Arc<dyn ResourceStore<Secret>>,
}

impl Stores {
    pub fn kube(client: Client) -> Self {
        Self {
            applications: Arc::new(KubeStore::<Application>::new(client.clone())),
            components: Arc::new(KubeStore::<Component>::new(client.clone())),
            detections: Arc::new(KubeStore::<ComponentDetectionQuery>::new(client.clone())),
            file_requests: Arc::new(KubeStore::<SPIFileContentRequest>::new(client.clone())),
            secrets: Arc::new(KubeStore::<Secret>::new(client)),
        }
    }
}

/// Everything the reconcilers share.
pub struct Context {
    pub stores: Stores,
    pub source: Arc<dyn SourceClient>,
    pub analyzer: Arc<dyn Analyzer>,
    pub gitops: Arc<dyn GitOpsGenerator>,
    pub repositories: Option<Arc<dyn RepositoryManager>>,
    pub metrics: Arc<Metrics>,
    pub config: OperatorConfig,
    pub(crate) analysis_permits: Semaphore,
}

impl Context {
    pub fn new(
        stores: Stores,
        source: Arc<dyn SourceClient>,
        analyzer: Arc<dyn Analyzer>,
        gitops: Arc<dyn GitOpsGenerator>,
        metrics: Arc<Metrics>,
        config: OperatorConfig,
    ) -> Self {
        let analysis_permits = Semaphore::new(config.max_concurrent_analyses.max(1));
        Self {
            stores,
            source,
            analyzer,
            gitops,
            repositories: None,
            metrics,
            config,
            analysis_permits,
        }
    }

    pub fn with_repositories(mut self, repositories: Arc<dyn RepositoryManager>) -> Self {
        self.repositories = Some(repositories);
        self
    }

    /// Read a source-control token from a Secret in `namespace`.
    pub async fn token_from_secret(&self, namespace: &str, name: &str) -> has_core::Result<String> {
        let secret = self
            .stores
            .secrets
            .get(&ObjectKey::new(namespace, name))
            .await?
            .ok_or_else(|| has_core::Error::Authentication(format!("secret {name} not found")))?;

        for key in TOKEN_KEYS {
            if let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) {
                if let Ok(token) = String::from_utf8(value.0.clone()) {
                    return Ok(token.trim().to_string());
                }
            }
            if let Some(value) = secret.string_data.as_ref().and_then(|d| d.get(key)) {
                return Ok(value.trim().to_string());
            }
        }
        Err(has_core::Error::Authentication(format!(
            "secret {name} has no token"
        )))
    }

    /// Scoped directory for one GitOps operation, removed when dropped.
    pub fn gitops_workdir(&self) -> has_core::Result<tempfile::TempDir> {
        tempfile::Builder::new()
            .prefix("has-gitops-")
            .tempdir()
            .map_err(|e| has_core::Error::Internal(format!("unable to create work directory: {e}")))
    }
}
