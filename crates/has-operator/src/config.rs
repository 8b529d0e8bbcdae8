//! Command line and environment settings for `has-operator run`.

use clap::Args;
use has_controller::OperatorConfig;
use has_controller::config::DEFAULT_IMAGE_REGISTRY;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "HAS_NAMESPACE")]
    namespace: Option<String>,

    /// Concurrent reconciles per resource kind
    #[arg(long, env = "HAS_WORKERS_PER_KIND", default_value_t = 2)]
    workers_per_kind: usize,

    /// Repository analyses allowed to run at once
    #[arg(long, env = "HAS_MAX_CONCURRENT_ANALYSES", default_value_t = 4)]
    max_concurrent_analyses: usize,

    /// Reconciles tolerated without the referenced Application
    #[arg(long, env = "HAS_APPLICATION_MISSING_THRESHOLD", default_value_t = 3)]
    application_missing_threshold: u32,

    /// Seconds between checks for a missing Application
    #[arg(long, env = "HAS_APPLICATION_MISSING_REQUEUE_SECS", default_value_t = 5)]
    application_missing_requeue_secs: u64,

    /// Failed external cleanups tolerated before a finalizer is removed
    #[arg(long, env = "HAS_FINALIZE_RETRY_LIMIT", default_value_t = 5)]
    finalize_retry_limit: u32,

    /// Timeout of source host requests, in seconds
    #[arg(long, env = "HAS_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    http_timeout_secs: u64,

    #[arg(long, env = "HAS_HTTP_RETRY_ATTEMPTS", default_value_t = 3)]
    http_retry_attempts: u32,

    #[arg(long, env = "HAS_ANALYZER_RETRY_ATTEMPTS", default_value_t = 3)]
    analyzer_retry_attempts: u32,

    /// Seconds between polls of a pending file content request
    #[arg(long, env = "HAS_FILE_REQUEST_POLL_SECS", default_value_t = 5)]
    file_request_poll_secs: u64,

    /// Token used for GitOps pushes and GitHub API calls
    #[arg(long, env = "HAS_GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Organization in which Application GitOps repositories are generated
    #[arg(long, env = "HAS_GITOPS_ORG")]
    gitops_org: Option<String>,

    /// Registry for images built by the service
    #[arg(long, env = "HAS_IMAGE_REGISTRY", default_value = DEFAULT_IMAGE_REGISTRY)]
    image_registry: String,
}

impl RunArgs {
    pub fn into_config(self) -> OperatorConfig {
        OperatorConfig {
            namespace: self.namespace.filter(|n| !n.is_empty()),
            workers_per_kind: self.workers_per_kind,
            max_concurrent_analyses: self.max_concurrent_analyses,
            application_missing_threshold: self.application_missing_threshold,
            application_missing_requeue: Duration::from_secs(self.application_missing_requeue_secs),
            finalize_retry_limit: self.finalize_retry_limit,
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            http_retry_attempts: self.http_retry_attempts,
            analyzer_retry_attempts: self.analyzer_retry_attempts,
            file_request_poll: Duration::from_secs(self.file_request_poll_secs),
            github_token: self.github_token.filter(|t| !t.is_empty()),
            gitops_org: self.gitops_org.filter(|o| !o.is_empty()),
            image_registry: self.image_registry,
            ..OperatorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: RunArgs,
    }

    fn parse(args: &[&str]) -> OperatorConfig {
        let argv = std::iter::once("has-operator").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().args.into_config()
    }

    #[test]
    fn test_defaults_match_operator_defaults() {
        let config = parse(&[]);
        let defaults = OperatorConfig::default();
        assert_eq!(config.namespace, None);
        assert_eq!(config.workers_per_kind, defaults.workers_per_kind);
        assert_eq!(config.max_concurrent_analyses, defaults.max_concurrent_analyses);
        assert_eq!(config.application_missing_threshold, defaults.application_missing_threshold);
        assert_eq!(config.application_missing_requeue, defaults.application_missing_requeue);
        assert_eq!(config.finalize_retry_limit, defaults.finalize_retry_limit);
        assert_eq!(config.http_timeout, defaults.http_timeout);
        assert_eq!(config.file_request_poll, defaults.file_request_poll);
        assert_eq!(config.image_registry, DEFAULT_IMAGE_REGISTRY);
        assert!(!config.generates_gitops_repositories());
    }

    #[test]
    fn test_flags() {
        let config = parse(&[
            "--namespace",
            "team-a",
            "--workers-per-kind",
            "8",
            "--http-timeout-secs",
            "10",
            "--github-token",
            "ghp_example",
            "--gitops-org",
            "redhat-appstudio-appdata",
        ]);
        assert_eq!(config.namespace.as_deref(), Some("team-a"));
        assert_eq!(config.workers_per_kind, 8);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert!(config.generates_gitops_repositories());
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = parse(&["--namespace", "", "--github-token", ""]);
        assert_eq!(config.namespace, None);
        assert_eq!(config.github_token, None);
    }
}
