//! Custom resources owned by the application service.

pub mod application;
pub mod component;
pub mod detection;
pub mod file_content;

pub use application::{Application, ApplicationGitRepository, ApplicationSpec, ApplicationStatus};
pub use component::{
    Component, ComponentSource, ComponentSpec, ComponentStatus, GitOpsStatus, GitSource,
    normalize_context,
};
pub use detection::{
    ComponentDetectionDescription, ComponentDetectionQuery, ComponentDetectionQuerySpec,
    ComponentDetectionQueryStatus,
};
pub use file_content::{
    FileContentPhase, SPIFileContentRequest, SPIFileContentRequestSpec,
    SPIFileContentRequestStatus,
};

/// API group shared by all resources.
pub const GROUP: &str = "appstudio.redhat.com";
