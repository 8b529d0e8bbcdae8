//! Repository analyzer contract.
//!
//! Analyzers inspect a source repository and report, per context directory,
//! what can be built from it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;

/// Context key used for the repository root.
pub const ROOT_CONTEXT: &str = "./";

/// What to analyze.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub repo_url: String,
    pub revision: Option<String>,
    pub context: Option<String>,
    /// Token for private repositories. Never logged.
    pub token: Option<String>,
}

/// Findings for one context directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedContext {
    /// Inline devfile content when one was found or selected.
    pub devfile: Option<String>,
    /// Absolute URL of the devfile.
    pub devfile_url: Option<String>,
    /// Absolute URL of the Dockerfile.
    pub dockerfile_url: Option<String>,
    pub ports: Vec<i32>,
    pub language: Option<String>,
    pub project_type: Option<String>,
}

impl DetectedContext {
    pub fn has_devfile(&self) -> bool {
        self.devfile.is_some() || self.devfile_url.is_some()
    }

    pub fn is_recognized(&self) -> bool {
        self.language.is_some()
    }
}

/// Findings keyed by context (`./` for the root).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub contexts: BTreeMap<String, DetectedContext>,
}

/// Trait for repository analyzers.
///
/// Errors follow the core classification: `NotFound`, `Authentication` and
/// `Validation` are terminal; `Transient` is retried by the caller.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Name of this analyzer.
    fn name(&self) -> &'static str;

    /// Analyze a repository.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult>;
}
