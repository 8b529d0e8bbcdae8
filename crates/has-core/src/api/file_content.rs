//! File content requests served by the token-vending service.
//!
//! The controller writes a request for one file of a private repository and
//! polls its status until the service delivers the content or reports an error.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "appstudio.redhat.com",
    version = "v1beta1",
    kind = "SPIFileContentRequest",
    namespaced,
    status = "SPIFileContentRequestStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SPIFileContentRequestSpec {
    pub repo_url: String,
    pub file_path: String,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum FileContentPhase {
    #[default]
    AwaitingTokenData,
    Delivered,
    Error,
}

impl std::fmt::Display for FileContentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileContentPhase::AwaitingTokenData => write!(f, "AwaitingTokenData"),
            FileContentPhase::Delivered => write!(f, "Delivered"),
            FileContentPhase::Error => write!(f, "Error"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SPIFileContentRequestStatus {
    #[serde(default)]
    pub phase: FileContentPhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
