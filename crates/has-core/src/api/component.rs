//! Component resource.

use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a Component.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "appstudio.redhat.com",
    version = "v1alpha1",
    kind = "Component",
    namespaced,
    status = "ComponentStatus",
    shortname = "hascmp",
    printcolumn = r#"{"name":"Component", "type":"string", "jsonPath":".spec.componentName"}"#,
    printcolumn = r#"{"name":"Application", "type":"string", "jsonPath":".spec.application"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Logical name recorded in the Application devfile.
    pub component_name: String,

    /// Name of the Application in the same namespace.
    pub application: String,

    /// Secret holding credentials for a private repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ComponentSource>,

    /// Prebuilt image. Without a git source this makes the component image-sourced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub target_port: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, rename = "skipGitOpsResourceGeneration")]
    pub skip_gitops_resource_generation: bool,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

impl ComponentSpec {
    pub fn git_source(&self) -> Option<&GitSource> {
        self.source.as_ref().and_then(|s| s.git.as_ref())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSource>,
}

/// A git repository holding the component source.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitSource {
    pub url: String,

    /// Branch, tag or commit. The host default branch when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    /// Subdirectory of the repository holding the component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devfile_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile_url: Option<String>,
}

impl GitSource {
    /// Context with leading `./` and surrounding slashes removed; empty for the root.
    pub fn normalized_context(&self) -> &str {
        normalize_context(self.context.as_deref().unwrap_or_default())
    }
}

/// Strips `./` and slashes so `./`, `/` and `` all denote the repository root.
pub fn normalize_context(context: &str) -> &str {
    let trimmed = context.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let trimmed = trimmed.trim_matches('/');
    if trimmed == "." { "" } else { trimmed }
}

/// Where the rendered GitOps resources live.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsStatus {
    #[serde(
        default,
        rename = "repositoryURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub repository_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, rename = "commitID", skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,

    #[serde(default)]
    pub resource_generation_skipped: bool,
}

/// Observed state of a Component.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Rendered component devfile, serialized as YAML.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devfile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,

    #[serde(default, rename = "gitops", skip_serializing_if = "Option::is_none")]
    pub gitops: Option<GitOpsStatus>,
}

impl Component {
    pub fn git_source(&self) -> Option<&GitSource> {
        self.spec.git_source()
    }

    /// True for components deployed from a prebuilt image with no git source.
    pub fn is_image_component(&self) -> bool {
        self.git_source().is_none()
            && self
                .spec
                .container_image
                .as_deref()
                .is_some_and(|i| !i.is_empty())
    }

    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    pub fn devfile(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.devfile.as_deref())
            .filter(|d| !d.is_empty())
    }
}
