//! Core domain types and traits for the application service.
//!
//! This crate contains:
//! - Custom resource definitions (Application, Component, ComponentDetectionQuery,
//!   file-content requests)
//! - Status condition helpers
//! - Well-known annotation, label, attribute and finalizer keys
//! - The component name resolver
//! - Collaborator traits (repository analyzer, GitOps generator)

pub mod analyzer;
pub mod api;
pub mod condition;
pub mod error;
pub mod gitops;
pub mod id;
pub mod keys;
pub mod naming;
pub mod sanitize;

pub use error::{Error, Result};
pub use id::ObjectKey;
