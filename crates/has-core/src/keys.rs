//! Well-known keys shared with the cluster, the devfile and GitOps output.
//!
//! These are part of the external contract and are case-sensitive.

/// Finalizer attached to Applications.
pub const APPLICATION_FINALIZER: &str = "application.appstudio.redhat.com/finalizer";
/// Finalizer attached to Components.
pub const COMPONENT_FINALIZER: &str = "component.appstudio.redhat.com/finalizer";

// Labels and annotations.
pub const LABEL_APPLICATION: &str = "appstudio.has/application";
pub const LABEL_COMPONENT: &str = "appstudio.has/component";
pub const ANNOTATION_ROUTE: &str = "appstudio.has/route";
pub const ANNOTATION_REPLICAS: &str = "appstudio.has/replicas";
pub const ANNOTATION_STORAGE_LIMIT: &str = "appstudio.has/storageLimit";
pub const ANNOTATION_STORAGE_REQUEST: &str = "appstudio.has/storageRequest";
pub const ANNOTATION_EPHEMERAL_STORAGE_LIMIT: &str = "appstudio.has/ephemeralStorageLimit";
pub const ANNOTATION_EPHEMERAL_STORAGE_REQUEST: &str = "appstudio.has/ephemeralStorageRequest";

/// Counts reconciles that could not find the referenced Application.
pub const ANNOTATION_APPLICATION_MISSING_COUNT: &str = "appstudio.has/application-missing-count";
/// Counts failed finalizer attempts.
pub const ANNOTATION_FINALIZE_COUNT: &str = "appstudio.has/finalize-count";
/// Requests a one-shot regeneration of GitOps resources.
pub const ANNOTATION_FORCE_GENERATE_GITOPS: &str = "force-generate-gitops";
/// Marks an Application whose GitOps repository was created by the operator.
pub const ANNOTATION_GITOPS_REPO_GENERATED: &str = "appstudio.has/gitops-repo-generated";
/// Name chosen for the generated GitOps repository, saved before it is created.
pub const ANNOTATION_GITOPS_REPO_NAME: &str = "appstudio.has/gitops-repo-name";

// Devfile attribute keys.
pub const ATTR_ROUTE: &str = "route";
pub const ATTR_REPLICAS: &str = "replicas";
pub const ATTR_CONTAINER_IMAGE_PREFIX: &str = "containerImage/";
pub const ATTR_GITOPS_URL: &str = "gitOpsRepository.url";
pub const ATTR_GITOPS_BRANCH: &str = "gitOpsRepository.branch";
pub const ATTR_GITOPS_CONTEXT: &str = "gitOpsRepository.context";
pub const ATTR_APP_MODEL_URL: &str = "appModelRepository.url";
pub const ATTR_STORAGE_LIMIT: &str = "storageLimit";
pub const ATTR_STORAGE_REQUEST: &str = "storageRequest";
pub const ATTR_EPHEMERAL_STORAGE_LIMIT: &str = "ephemeralStorageLimit";
pub const ATTR_EPHEMERAL_STORAGE_REQUEST: &str = "ephemeralStorageRequest";
pub const ATTR_MEMORY_LIMIT: &str = "memoryLimit";
pub const ATTR_MEMORY_REQUEST: &str = "memoryRequest";
pub const ATTR_CPU_LIMIT: &str = "cpuLimit";
pub const ATTR_CPU_REQUEST: &str = "cpuRequest";
pub const ATTR_CONTAINER_IMAGE_PORT: &str = "containerImagePort";
pub const ATTR_CONTAINER_ENV: &str = "containerENV";

/// Placeholder application name written into detected component stubs.
pub const PLACEHOLDER_APPLICATION: &str = "insert-application-name";

/// Attribute key holding the container image of an image-sourced component.
pub fn container_image_attribute(component_name: &str) -> String {
    format!("{}{}", ATTR_CONTAINER_IMAGE_PREFIX, component_name)
}

/// Resource names mapped to their limit and request attribute keys.
pub const RESOURCE_ATTRIBUTES: [(&str, &str, &str); 4] = [
    ("cpu", ATTR_CPU_LIMIT, ATTR_CPU_REQUEST),
    ("memory", ATTR_MEMORY_LIMIT, ATTR_MEMORY_REQUEST),
    ("storage", ATTR_STORAGE_LIMIT, ATTR_STORAGE_REQUEST),
    (
        "ephemeral-storage",
        ATTR_EPHEMERAL_STORAGE_LIMIT,
        ATTR_EPHEMERAL_STORAGE_REQUEST,
    ),
];
