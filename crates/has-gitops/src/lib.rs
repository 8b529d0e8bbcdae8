//! GitOps resource generation for the application service.
//!
//! Provides:
//! - Rendering of a component's Deployment, Service, Route and kustomization
//! - A generator that commits rendered resources to a git repository

pub mod error;
pub mod generator;
pub mod render;

pub use error::{GitOpsError, GitOpsResult};
pub use generator::GitCliGenerator;
pub use has_core::gitops::{GitOpsComponent, GitOpsGenerator, GitOpsTarget};
