//! GitHub API client for GitOps repository management.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::client::USER_AGENT;
use crate::metrics::GitHubApiMetrics;
use crate::{SourceError, SourceResult};

const GITHUB_API: &str = "https://api.github.com";

/// GitHub API client.
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    access_token: String,
    api_base: String,
    metrics: Option<GitHubApiMetrics>,
}

/// GitHub repository information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    pub full_name: String,
    pub private: bool,
    pub html_url: String,
    pub clone_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl GitHubClient {
    pub fn new(access_token: String, timeout: Duration) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))?;
        Ok(Self {
            client,
            access_token,
            api_base: GITHUB_API.to_string(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: GitHubApiMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Point the client at a different API root (GitHub Enterprise).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn record(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record(Some(&self.access_token), operation);
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
    }

    /// Get a specific repository by owner and name.
    pub async fn get_repo(&self, owner: &str, repo: &str) -> SourceResult<GitHubRepo> {
        self.record("get_repo");
        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| SourceError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(format!("{owner}/{repo}")));
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Request(e.without_url().to_string()))
    }

    /// Create a repository in an organization.
    pub async fn create_repo(&self, org: &str, name: &str, private: bool) -> SourceResult<GitHubRepo> {
        self.record("create_repo");
        let url = format!("{}/orgs/{}/repos", self.api_base, org);

        let payload = serde_json::json!({
            "name": name,
            "private": private,
            "auto_init": true,
            "description": "GitOps repository generated by the application service",
        });

        let response = self
            .authorized(self.client.post(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| SourceError::Request(e.without_url().to_string()))?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => {
                return Err(SourceError::Unauthorized(format!(
                    "creating {org}/{name} returned {status}"
                )));
            }
            s if !status.is_success() => {
                return Err(SourceError::Status { status: s, url });
            }
            _ => {}
        }

        let repo: GitHubRepo = response
            .json()
            .await
            .map_err(|e| SourceError::Request(e.without_url().to_string()))?;
        info!(repo = %repo.full_name, "Created GitOps repository");
        Ok(repo)
    }

    /// Delete a repository. Deleting one that is already gone succeeds.
    pub async fn delete_repo(&self, owner: &str, repo: &str) -> SourceResult<()> {
        self.record("delete_repo");
        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);

        let response = self
            .authorized(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| SourceError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            info!(repo = %format!("{owner}/{repo}"), "Deleted GitOps repository");
            return Ok(());
        }
        Err(SourceError::Status {
            status: status.as_u16(),
            url,
        })
    }
}
