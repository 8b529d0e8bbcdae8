//! ComponentDetectionQuery resource.
//!
//! A one-shot request to analyze a repository and propose Component stubs.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::component::{ComponentSpec, GitSource};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "appstudio.redhat.com",
    version = "v1alpha1",
    kind = "ComponentDetectionQuery",
    namespaced,
    status = "ComponentDetectionQueryStatus",
    shortname = "hascdq",
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDetectionQuerySpec {
    /// Repository to analyze. Only url, revision and context are read.
    pub git: GitSource,

    /// Secret holding a token for a private repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Resolve proposed names against existing Components.
    #[serde(default)]
    pub generate_component_name: bool,

    /// Drop detected contexts whose language could not be classified.
    #[serde(default)]
    pub recognized_content_only: bool,
}

/// One detected component.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDetectionDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,

    #[serde(default)]
    pub devfile_found: bool,

    pub component_stub: ComponentSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDetectionQueryStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Detected components keyed by proposed component name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub component_detected: BTreeMap<String, ComponentDetectionDescription>,
}

impl ComponentDetectionQuery {
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}
