//! GitOps generator contract.
//!
//! Generators render a component's deployment resources into a GitOps
//! repository and report the resulting commit.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use std::collections::BTreeMap;
use std::path::Path;

use crate::api::GitOpsStatus;
use crate::Result;

pub const DEFAULT_GITOPS_BRANCH: &str = "main";
pub const DEFAULT_GITOPS_CONTEXT: &str = "/";

/// Where to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOpsTarget {
    pub url: String,
    pub branch: String,
    pub context: String,
}

impl GitOpsTarget {
    pub fn new(url: impl Into<String>, branch: Option<&str>, context: Option<&str>) -> Self {
        Self {
            url: url.into(),
            branch: branch
                .filter(|b| !b.is_empty())
                .unwrap_or(DEFAULT_GITOPS_BRANCH)
                .to_string(),
            context: context
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_GITOPS_CONTEXT)
                .to_string(),
        }
    }

    /// Target recorded in a component status; `None` without a repository URL.
    pub fn from_status(status: &GitOpsStatus) -> Option<Self> {
        let url = status.repository_url.as_deref().filter(|u| !u.is_empty())?;
        Some(Self::new(
            url,
            status.branch.as_deref(),
            status.context.as_deref(),
        ))
    }
}

/// Everything a generator needs to render one component.
#[derive(Debug, Clone, PartialEq)]
pub struct GitOpsComponent {
    /// Logical component name (Spec.ComponentName).
    pub name: String,
    pub application: String,
    pub namespace: String,
    /// Fully rendered deployment.
    pub deployment: Deployment,
    /// Route host, when one was requested.
    pub route: Option<String>,
    /// Annotations copied onto the rendered resources.
    pub annotations: BTreeMap<String, String>,
}

/// Trait for GitOps generators.
///
/// Every operation works inside `workdir`, which the caller owns and removes.
/// Returned errors must not contain credentials.
#[async_trait]
pub trait GitOpsGenerator: Send + Sync {
    /// Name of this generator.
    fn name(&self) -> &'static str;

    /// Render a new component. Returns the commit ID.
    async fn generate(
        &self,
        workdir: &Path,
        target: &GitOpsTarget,
        component: &GitOpsComponent,
    ) -> Result<String>;

    /// Re-render a changed component. Returns the commit ID.
    async fn update(
        &self,
        workdir: &Path,
        target: &GitOpsTarget,
        before: &GitOpsComponent,
        after: &GitOpsComponent,
    ) -> Result<String>;

    /// Remove a component. Returns the commit ID.
    async fn remove(
        &self,
        workdir: &Path,
        target: &GitOpsTarget,
        component_name: &str,
    ) -> Result<String>;

    /// Render a component from scratch, discarding whatever is in the repository.
    async fn regenerate(
        &self,
        workdir: &Path,
        target: &GitOpsTarget,
        component: &GitOpsComponent,
    ) -> Result<String>;
}
