//! Prometheus metrics for the reconcilers.
//!
//! The registry is created once at process start; serving it is left to the
//! embedding binary.

use has_source::GitHubApiMetrics;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// Resource kinds reconciled by the operator, used as the `kind` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Application,
    Component,
    ComponentDetectionQuery,
}

impl ResourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Application => "Application",
            ResourceKind::Component => "Component",
            ResourceKind::ComponentDetectionQuery => "ComponentDetectionQuery",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub struct Metrics {
    registry: Registry,
    reconcile_requests: IntCounterVec,
    reconcile_success: IntCounterVec,
    reconcile_failed: IntCounterVec,
    git_import_total: IntCounter,
    git_import_success: IntCounter,
    git_import_failed: IntCounter,
    github: GitHubApiMetrics,
}

fn counter_vec(registry: &Registry, name: &str, help: &str) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help), &["kind"])?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconcile_requests = counter_vec(
            &registry,
            "has_reconcile_requests_total",
            "Number of reconcile requests by resource kind",
        )?;
        let reconcile_success = counter_vec(
            &registry,
            "has_reconcile_success_total",
            "Number of successful reconciles by resource kind",
        )?;
        let reconcile_failed = counter_vec(
            &registry,
            "has_reconcile_failed_total",
            "Number of reconciles that failed because of a system error, by resource kind",
        )?;
        let git_import_total = counter(
            &registry,
            "has_git_import_total",
            "Number of component imports from git repositories",
        )?;
        let git_import_success = counter(
            &registry,
            "has_git_import_success_total",
            "Number of successful component imports from git repositories",
        )?;
        let git_import_failed = counter(
            &registry,
            "has_git_import_failed_total",
            "Number of component imports from git repositories that failed because of a system error",
        )?;
        let github = GitHubApiMetrics::register(&registry)?;

        Ok(Self {
            registry,
            reconcile_requests,
            reconcile_success,
            reconcile_failed,
            git_import_total,
            git_import_success,
            git_import_failed,
            github,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Per-token GitHub API counters, shared with the source clients.
    pub fn github(&self) -> &GitHubApiMetrics {
        &self.github
    }

    pub fn reconcile_started(&self, kind: ResourceKind) {
        self.reconcile_requests.with_label_values(&[kind.label()]).inc();
    }

    pub fn reconcile_succeeded(&self, kind: ResourceKind) {
        self.reconcile_success.with_label_values(&[kind.label()]).inc();
    }

    pub fn reconcile_failed(&self, kind: ResourceKind) {
        self.reconcile_failed.with_label_values(&[kind.label()]).inc();
    }

    pub fn git_import_started(&self) {
        self.git_import_total.inc();
    }

    pub fn git_import_succeeded(&self) {
        self.git_import_success.inc();
    }

    pub fn git_import_failed(&self) {
        self.git_import_failed.inc();
    }

    pub fn requests(&self, kind: ResourceKind) -> u64 {
        self.reconcile_requests.with_label_values(&[kind.label()]).get()
    }

    pub fn successes(&self, kind: ResourceKind) -> u64 {
        self.reconcile_success.with_label_values(&[kind.label()]).get()
    }

    pub fn failures(&self, kind: ResourceKind) -> u64 {
        self.reconcile_failed.with_label_values(&[kind.label()]).get()
    }

    pub fn git_imports(&self) -> (u64, u64, u64) {
        (
            self.git_import_total.get(),
            self.git_import_success.get(),
            self.git_import_failed.get(),
        )
    }
}
