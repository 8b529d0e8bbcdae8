//! Application resource.
//!
//! An Application groups Components. Its status carries the aggregated
//! workspace description (devfile) of every Component that references it.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of an Application.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "appstudio.redhat.com",
    version = "v1alpha1",
    kind = "Application",
    namespaced,
    status = "ApplicationStatus",
    shortname = "hasapp",
    printcolumn = r#"{"name":"Display Name", "type":"string", "jsonPath":".spec.displayName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Human readable name, recorded as the devfile metadata name.
    pub display_name: String,

    /// Free-form description, recorded as the devfile metadata description.
    #[serde(default)]
    pub description: String,

    /// Repository that receives the rendered GitOps resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ops_repository: Option<ApplicationGitRepository>,

    /// Repository holding the application model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_model_repository: Option<ApplicationGitRepository>,
}

/// Location of a repository hint.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationGitRepository {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Observed state of an Application.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Aggregated devfile, serialized as YAML.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devfile: Option<String>,
}

impl Application {
    /// The aggregated devfile, when one has been rendered.
    pub fn devfile(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.devfile.as_deref())
            .filter(|d| !d.is_empty())
    }
}
