//! Devfile resolution for Components.
//!
//! Attempts, in order, each preempting the rest on success:
//! 1. An explicit devfile URL.
//! 2. An explicit Dockerfile URL, turned into a synthesized devfile.
//! 3. Well-known devfile locations in the repository context, then
//!    well-known Dockerfile locations.

use has_core::api::GitSource;
use has_devfile::deployment::{DeploymentParams, dockerfile_devfile, ensure_kubernetes_component};
use has_devfile::Devfile;
use tracing::{debug, warn};

use crate::client::SourceClient;
use crate::repo::{RepoUrl, resolve_relative};
use crate::{SourceError, SourceResult};

/// File names probed for a devfile, in order.
pub const DEVFILE_CANDIDATES: [&str; 6] = [
    "devfile.yaml",
    ".devfile.yaml",
    "devfile.yml",
    ".devfile.yml",
    ".devfile/devfile.yaml",
    ".devfile/devfile.yml",
];

/// Paths probed for a Dockerfile when no devfile exists, in order.
pub const DOCKERFILE_CANDIDATES: [&str; 5] = [
    "Dockerfile",
    "docker/Dockerfile",
    ".docker/Dockerfile",
    "build/Dockerfile",
    "Containerfile",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevfileOrigin {
    DevfileUrl(String),
    Dockerfile(String),
    Repository(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedDevfile {
    pub devfile: Devfile,
    pub origin: DevfileOrigin,
}

/// Parse fetched devfile content into the normalized form the reconcilers
/// store: exactly one kubernetes component, synthesized when missing.
pub fn from_content(content: &str, params: &DeploymentParams) -> SourceResult<Devfile> {
    let mut devfile = Devfile::parse(content)?;
    devfile.retain_first_kubernetes_component();
    ensure_kubernetes_component(&mut devfile, params)?;
    Ok(devfile)
}

/// Make a relative kubernetes component URI absolute against `base`.
/// Returns true when the devfile changed.
pub fn absolutize_kubernetes_uri(devfile: &mut Devfile, base: &str) -> bool {
    let Some(kubernetes) = devfile
        .first_kubernetes_component_mut()
        .and_then(|c| c.kubernetes.as_mut())
    else {
        return false;
    };
    match kubernetes.uri.as_deref() {
        Some(uri) if !uri.starts_with("http://") && !uri.starts_with("https://") => {
            kubernetes.uri = Some(resolve_relative(base, uri));
            true
        }
        _ => false,
    }
}

pub struct DevfileResolver<'a> {
    client: &'a dyn SourceClient,
}

impl<'a> DevfileResolver<'a> {
    pub fn new(client: &'a dyn SourceClient) -> Self {
        Self { client }
    }

    /// Revision to read from: the requested one, else the host default branch.
    pub async fn revision(
        &self,
        repo: &RepoUrl,
        git: &GitSource,
        token: Option<&str>,
    ) -> SourceResult<String> {
        match git.revision.as_deref().filter(|r| !r.is_empty()) {
            Some(revision) => Ok(revision.to_string()),
            None => self.client.default_branch(repo, token).await,
        }
    }

    pub async fn resolve(
        &self,
        git: &GitSource,
        token: Option<&str>,
        params: &DeploymentParams,
    ) -> SourceResult<ResolvedDevfile> {
        if let Some(url) = git.devfile_url.as_deref().filter(|u| !u.is_empty()) {
            let content = self
                .client
                .fetch(url, token)
                .await?
                .ok_or_else(|| SourceError::NotFound(format!("devfile not found at {url}")))?;
            let devfile = self.prepare(&content, params, url, token).await?;
            return Ok(ResolvedDevfile {
                devfile,
                origin: DevfileOrigin::DevfileUrl(url.to_string()),
            });
        }

        if let Some(url) = git.dockerfile_url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(ResolvedDevfile {
                devfile: dockerfile_devfile(params, url)?,
                origin: DevfileOrigin::Dockerfile(url.to_string()),
            });
        }

        let repo = RepoUrl::parse(&git.url).map_err(|e| SourceError::DefaultBranch(e.to_string()))?;
        let revision = self.revision(&repo, git, token).await?;
        let context = git.normalized_context();

        for candidate in DEVFILE_CANDIDATES {
            let url = repo.raw_file_url(&revision, context, candidate);
            if let Some(content) = self.client.fetch(&url, token).await? {
                debug!(url = %url, "Found devfile");
                let devfile = self.prepare(&content, params, &url, token).await?;
                return Ok(ResolvedDevfile {
                    devfile,
                    origin: DevfileOrigin::Repository(url),
                });
            }
        }

        for candidate in DOCKERFILE_CANDIDATES {
            let url = repo.raw_file_url(&revision, context, candidate);
            if self.client.fetch(&url, token).await?.is_some() {
                debug!(url = %url, "Found Dockerfile");
                return Ok(ResolvedDevfile {
                    devfile: dockerfile_devfile(params, &url)?,
                    origin: DevfileOrigin::Dockerfile(url),
                });
            }
        }

        Err(SourceError::NotFound(format!(
            "unable to find a devfile or Dockerfile in {} at context {:?}",
            repo.web_url(),
            if context.is_empty() { "./" } else { context }
        )))
    }

    async fn prepare(
        &self,
        content: &str,
        params: &DeploymentParams,
        source_url: &str,
        token: Option<&str>,
    ) -> SourceResult<Devfile> {
        let mut devfile = Devfile::parse(content)?;
        devfile.retain_first_kubernetes_component();
        self.inline_kubernetes_uri(&mut devfile, source_url, token).await;
        ensure_kubernetes_component(&mut devfile, params)?;
        Ok(devfile)
    }

    /// Replace a kubernetes component URI with the manifest it points at.
    /// Unreachable manifests are left as URIs.
    async fn inline_kubernetes_uri(&self, devfile: &mut Devfile, base: &str, token: Option<&str>) {
        let Some(kubernetes) = devfile
            .first_kubernetes_component_mut()
            .and_then(|c| c.kubernetes.as_mut())
        else {
            return;
        };
        if kubernetes.inlined.is_some() {
            return;
        }
        let Some(uri) = kubernetes.uri.clone() else {
            return;
        };

        let url = resolve_relative(base, &uri);
        match self.client.fetch(&url, token).await {
            Ok(Some(manifest)) => {
                kubernetes.inlined = Some(manifest);
                kubernetes.uri = None;
            }
            Ok(None) => warn!(url = %url, "Kubernetes component manifest not found"),
            Err(e) => warn!(url = %url, error = %e, "Failed to fetch kubernetes component manifest"),
        }
    }
}
