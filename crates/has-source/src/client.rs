//! HTTP access to repository content.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::metrics::GitHubApiMetrics;
use crate::repo::{GitHost, RepoUrl};
use crate::{SourceError, SourceResult};

pub const USER_AGENT: &str = "application-service";

const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Delay before retry number `attempt` (1-based), doubling up to a cap.
fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY
        .checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

/// Read access to source repositories.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch a file. `Ok(None)` when the host reports it missing.
    async fn fetch(&self, url: &str, token: Option<&str>) -> SourceResult<Option<String>>;

    /// Default branch of a repository. Failures of any kind surface as
    /// [`SourceError::DefaultBranch`].
    async fn default_branch(&self, repo: &RepoUrl, token: Option<&str>) -> SourceResult<String>;
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: Option<String>,
}

/// [`SourceClient`] over plain HTTPS with a request timeout and bounded
/// retries on transient failures.
pub struct HttpSourceClient {
    client: reqwest::Client,
    retry_attempts: u32,
    metrics: Option<GitHubApiMetrics>,
}

impl HttpSourceClient {
    pub fn new(timeout: Duration, retry_attempts: u32) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))?;
        Ok(Self {
            client,
            retry_attempts: retry_attempts.max(1),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: GitHubApiMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn request(&self, url: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            request = if url.contains("gitlab") {
                request.header("PRIVATE-TOKEN", token)
            } else {
                request.header("Authorization", format!("Bearer {}", token))
            };
        }
        request
    }

    async fn get(&self, url: &str, token: Option<&str>) -> SourceResult<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.request(url, token).send().await;
            let retryable = match &result {
                Ok(response) => {
                    response.status().is_server_error()
                        || response.status() == StatusCode::TOO_MANY_REQUESTS
                }
                Err(e) => e.is_timeout() || e.is_connect(),
            };
            if !retryable || attempt >= self.retry_attempts {
                return result.map_err(|e| SourceError::Request(e.without_url().to_string()));
            }

            let delay = retry_delay(attempt);
            debug!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "Retrying request");
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch(&self, url: &str, token: Option<&str>) -> SourceResult<Option<String>> {
        let response = self.get(url, token).await?;
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(SourceError::Unauthorized(format!("{url} returned {status}")))
            }
            s if s.is_success() => response
                .text()
                .await
                .map(Some)
                .map_err(|e| SourceError::Request(e.without_url().to_string())),
            s => Err(SourceError::Status {
                status: s.as_u16(),
                url: url.to_string(),
            }),
        }
    }

    async fn default_branch(&self, repo: &RepoUrl, token: Option<&str>) -> SourceResult<String> {
        if repo.host == GitHost::GitHub {
            if let Some(metrics) = &self.metrics {
                metrics.record(token, "get_default_branch");
            }
        }

        let url = repo.api_url();
        let response = self
            .get(&url, token)
            .await
            .map_err(|e| SourceError::DefaultBranch(format!("{}: {}", repo.web_url(), e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::DefaultBranch(format!(
                "{} returned {}",
                repo.web_url(),
                status
            )));
        }

        let info: RepoInfo = response
            .json()
            .await
            .map_err(|e| SourceError::DefaultBranch(format!("{}: {}", repo.web_url(), e)))?;
        info.default_branch
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                SourceError::DefaultBranch(format!("{} has no default branch", repo.web_url()))
            })
    }
}
