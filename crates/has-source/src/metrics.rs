//! Host API call accounting.

use prometheus::{IntCounterVec, Opts, Registry};

const ANONYMOUS: &str = "anonymous";

/// Counts GitHub API operations per token and operation name.
///
/// Tokens are never used as label values directly; the label carries an md5
/// fingerprint instead.
#[derive(Clone)]
pub struct GitHubApiMetrics {
    operations: IntCounterVec,
}

impl GitHubApiMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let operations = IntCounterVec::new(
            Opts::new(
                "has_github_api_operations_total",
                "Number of GitHub API operations by token and operation",
            ),
            &["token", "operation"],
        )?;
        registry.register(Box::new(operations.clone()))?;
        Ok(Self { operations })
    }

    pub fn record(&self, token: Option<&str>, operation: &str) {
        let fingerprint = token_fingerprint(token);
        self.operations
            .with_label_values(&[fingerprint.as_str(), operation])
            .inc();
    }

    pub fn count(&self, token: Option<&str>, operation: &str) -> u64 {
        let fingerprint = token_fingerprint(token);
        self.operations
            .with_label_values(&[fingerprint.as_str(), operation])
            .get()
    }
}

/// Stable, non-reversible label for a token.
pub fn token_fingerprint(token: Option<&str>) -> String {
    match token.filter(|t| !t.is_empty()) {
        Some(token) => format!("{:x}", md5::compute(token)),
        None => ANONYMOUS.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_by_fingerprint() {
        let registry = Registry::new();
        let metrics = GitHubApiMetrics::register(&registry).unwrap();

        metrics.record(Some("ghp_secret"), "get_repo");
        metrics.record(Some("ghp_secret"), "get_repo");
        metrics.record(None, "get_repo");

        assert_eq!(metrics.count(Some("ghp_secret"), "get_repo"), 2);
        assert_eq!(metrics.count(None, "get_repo"), 1);

        let families = registry.gather();
        let rendered = format!("{:?}", families);
        assert!(!rendered.contains("ghp_secret"));
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(token_fingerprint(None), "anonymous");
        assert_eq!(token_fingerprint(Some("")), "anonymous");
        assert_eq!(token_fingerprint(Some("abc")).len(), 32);
    }
}
