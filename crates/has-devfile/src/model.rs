//! Devfile document model.
//!
//! Only the fields the service reads or writes are typed. Everything else is
//! carried through the `extra` maps so that a parse/serialize cycle keeps
//! unknown content intact.

use crate::attributes::Attributes;
use crate::error::{DevfileError, DevfileResult};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::BTreeMap;

pub const DEFAULT_SCHEMA_VERSION: &str = "2.2.0";

/// Name given to kubernetes components the service synthesizes.
pub const KUBERNETES_COMPONENT_NAME: &str = "kubernetes-deploy";

/// Name given to image components built from a Dockerfile.
pub const DOCKERFILE_COMPONENT_NAME: &str = "dockerfile-build";

/// Remote name used for application projects.
pub const ORIGIN_REMOTE: &str = "origin";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Devfile {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<Project>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<DevfileComponent>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.language.is_none()
            && self.project_type.is_none()
            && self.attributes.is_empty()
            && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitProjectSource>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitProjectSource {
    #[serde(default)]
    pub remotes: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevfileComponent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageComponent>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesComponent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inlined: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<Endpoint>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub name: String,
    pub target_port: i32,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageComponent {
    #[serde(default)]
    pub image_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<DockerfileImage>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerfileImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_required: Option<bool>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl DockerfileImage {
    /// Whether the URI points somewhere inside the repository rather than at
    /// an absolute location.
    pub fn has_relative_uri(&self) -> bool {
        self.uri
            .as_deref()
            .is_some_and(|uri| !uri.starts_with("http://") && !uri.starts_with("https://"))
    }
}

impl Devfile {
    /// Create an empty devfile at the default schema version.
    pub fn new(name: &str) -> Self {
        Self {
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            metadata: Metadata {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Parse a devfile document.
    pub fn parse(content: &str) -> DevfileResult<Self> {
        let devfile: Devfile = serde_yaml::from_str(content)?;
        if devfile.schema_version.trim().is_empty() {
            return Err(DevfileError::MissingSchemaVersion);
        }
        Ok(devfile)
    }

    /// Serialize the devfile. Serializing a parsed devfile, parsing the result
    /// and serializing again yields identical text.
    pub fn to_yaml(&self) -> DevfileResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.metadata.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.metadata.attributes
    }

    pub fn kubernetes_components(&self) -> impl Iterator<Item = &DevfileComponent> {
        self.components.iter().filter(|c| c.kubernetes.is_some())
    }

    pub fn first_kubernetes_component(&self) -> Option<&DevfileComponent> {
        self.kubernetes_components().next()
    }

    pub fn first_kubernetes_component_mut(&mut self) -> Option<&mut DevfileComponent> {
        self.components.iter_mut().find(|c| c.kubernetes.is_some())
    }

    pub fn image_components_mut(&mut self) -> impl Iterator<Item = &mut DevfileComponent> {
        self.components.iter_mut().filter(|c| c.image.is_some())
    }

    pub fn has_kubernetes_component(&self) -> bool {
        self.first_kubernetes_component().is_some()
    }

    /// Drop every kubernetes component after the first one. Returns true when
    /// anything was removed.
    pub fn retain_first_kubernetes_component(&mut self) -> bool {
        let before = self.components.len();
        let mut seen = false;
        self.components.retain(|c| {
            if c.kubernetes.is_none() {
                return true;
            }
            let keep = !seen;
            seen = true;
            keep
        });
        before != self.components.len()
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Insert or update a git project with an `origin` remote. Returns true
    /// when the devfile changed.
    pub fn upsert_project(&mut self, name: &str, url: &str) -> bool {
        if let Some(project) = self.projects.iter_mut().find(|p| p.name == name) {
            let git = project.git.get_or_insert_with(Default::default);
            if git.remotes.get(ORIGIN_REMOTE).map(String::as_str) == Some(url) {
                return false;
            }
            git.remotes.insert(ORIGIN_REMOTE.to_string(), url.to_string());
            return true;
        }

        let mut remotes = BTreeMap::new();
        remotes.insert(ORIGIN_REMOTE.to_string(), url.to_string());
        self.projects.push(Project {
            name: name.to_string(),
            git: Some(GitProjectSource {
                remotes,
                extra: Mapping::new(),
            }),
            extra: Mapping::new(),
        });
        true
    }

    /// Remove a project by name. Returns true when it was present.
    pub fn remove_project(&mut self, name: &str) -> bool {
        let before = self.projects.len();
        self.projects.retain(|p| p.name != name);
        before != self.projects.len()
    }
}
