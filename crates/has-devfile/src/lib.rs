//! Devfile workspace model for the application service.
//!
//! This crate handles:
//! - Parsing and serializing devfiles with stable output
//! - Typed access to the untyped attribute maps
//! - Quantity canonicalization
//! - Merging Component specs into a component devfile
//! - Extracting Component stubs from detected devfiles
//! - Deployment synthesis for devfiles without a kubernetes component

pub mod attributes;
pub mod deployment;
pub mod error;
pub mod merge;
pub mod model;
pub mod quantity;
pub mod stub;

pub use attributes::{Attributes, EnvEntry};
pub use error::{DevfileError, DevfileResult};
pub use model::{
    DEFAULT_SCHEMA_VERSION, Devfile, DevfileComponent, DockerfileImage, Endpoint,
    GitProjectSource, ImageComponent, KubernetesComponent, Metadata, Project,
};
