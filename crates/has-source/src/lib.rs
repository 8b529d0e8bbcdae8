//! Source repository access for the application service.
//!
//! This crate handles:
//! - Git host URL parsing and raw-content URLs
//! - HTTP fetches of repository files and default-branch lookups
//! - GitHub repository management for generated GitOps repositories
//! - Devfile resolution for Components
//! - The git-clone based repository analyzer

pub mod analyzer;
pub mod client;
pub mod error;
pub mod git;
pub mod github;
pub mod metrics;
pub mod repo;
pub mod resolve;

pub use analyzer::GitAnalyzer;
pub use client::{HttpSourceClient, SourceClient};
pub use error::{SourceError, SourceResult};
pub use github::GitHubClient;
pub use metrics::GitHubApiMetrics;
pub use repo::{GitHost, RepoUrl};
pub use resolve::{DEVFILE_CANDIDATES, DOCKERFILE_CANDIDATES, ResolvedDevfile};
