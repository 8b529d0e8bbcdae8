//! Rendering of component resources into a kustomize layout.
//!
//! Layout under the target context:
//!
//! ```text
//! components/
//!   kustomization.yaml
//!   <component>/base/
//!     deployment.yaml
//!     service.yaml
//!     route.yaml
//!     kustomization.yaml
//! ```

use has_core::api::normalize_context;
use has_core::gitops::GitOpsComponent;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{GitOpsError, GitOpsResult};

pub const COMPONENTS_DIR: &str = "components";
const BASE_DIR: &str = "base";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub name: &'static str,
    pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Kustomization {
    api_version: &'static str,
    kind: &'static str,
    resources: Vec<String>,
}

impl Kustomization {
    fn new(resources: Vec<String>) -> Self {
        Self {
            api_version: "kustomize.config.k8s.io/v1beta1",
            kind: "Kustomization",
            resources,
        }
    }
}

/// Directory holding every component, relative to the repository root.
pub fn components_dir(repo_root: &Path, context: &str) -> PathBuf {
    let context = normalize_context(context);
    if context.is_empty() {
        repo_root.join(COMPONENTS_DIR)
    } else {
        repo_root.join(context).join(COMPONENTS_DIR)
    }
}

/// Directory holding one component's base resources.
pub fn component_dir(repo_root: &Path, context: &str, component_name: &str) -> PathBuf {
    components_dir(repo_root, context)
        .join(component_name)
        .join(BASE_DIR)
}

fn container_port(component: &GitOpsComponent) -> Option<i32> {
    component
        .deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()?
        .ports
        .as_ref()?
        .first()
        .map(|p| p.container_port)
}

fn metadata(component: &GitOpsComponent) -> ObjectMeta {
    let labels = component.deployment.metadata.labels.clone();
    ObjectMeta {
        name: Some(component.name.clone()),
        namespace: (!component.namespace.is_empty()).then(|| component.namespace.clone()),
        labels,
        annotations: (!component.annotations.is_empty()).then(|| component.annotations.clone()),
        ..Default::default()
    }
}

fn service(component: &GitOpsComponent, port: i32) -> Service {
    let selector = component
        .deployment
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
        .unwrap_or_else(|| {
            BTreeMap::from([(
                "app.kubernetes.io/instance".to_string(),
                component.name.clone(),
            )])
        });

    Service {
        metadata: metadata(component),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

fn route(component: &GitOpsComponent, port: i32) -> serde_json::Value {
    let meta = metadata(component);
    let mut spec = json!({
        "port": { "targetPort": port },
        "to": { "kind": "Service", "name": component.name, "weight": 100 },
        "tls": {
            "insecureEdgeTerminationPolicy": "Redirect",
            "termination": "edge",
        },
    });
    if let Some(host) = component.route.as_deref().filter(|h| !h.is_empty()) {
        spec["host"] = json!(host);
    }
    json!({
        "apiVersion": "route.openshift.io/v1",
        "kind": "Route",
        "metadata": meta,
        "spec": spec,
    })
}

/// Render one component's base resources.
pub fn render_component(component: &GitOpsComponent) -> GitOpsResult<Vec<RenderedFile>> {
    if component.name.is_empty() {
        return Err(GitOpsError::Render("component name is empty".to_string()));
    }

    let mut deployment = component.deployment.clone();
    deployment.metadata = ObjectMeta {
        annotations: metadata(component).annotations,
        ..deployment.metadata
    };

    let mut files = vec![RenderedFile {
        name: "deployment.yaml",
        content: serde_yaml::to_string(&deployment)?,
    }];

    if let Some(port) = container_port(component) {
        files.push(RenderedFile {
            name: "service.yaml",
            content: serde_yaml::to_string(&service(component, port))?,
        });
        files.push(RenderedFile {
            name: "route.yaml",
            content: serde_yaml::to_string(&route(component, port))?,
        });
    }

    let resources = files.iter().map(|f| f.name.to_string()).collect();
    files.push(RenderedFile {
        name: "kustomization.yaml",
        content: serde_yaml::to_string(&Kustomization::new(resources))?,
    });
    Ok(files)
}

/// Write a component's files, replacing whatever was in its directory.
pub async fn write_component(
    repo_root: &Path,
    context: &str,
    component: &GitOpsComponent,
) -> GitOpsResult<()> {
    let files = render_component(component)?;
    let dir = component_dir(repo_root, context, &component.name);
    if dir.exists() {
        tokio::fs::remove_dir_all(&dir).await?;
    }
    tokio::fs::create_dir_all(&dir).await?;
    for file in files {
        tokio::fs::write(dir.join(file.name), file.content).await?;
    }
    write_components_kustomization(repo_root, context).await
}

/// Delete a component's directory. Returns false when it did not exist.
pub async fn remove_component(
    repo_root: &Path,
    context: &str,
    component_name: &str,
) -> GitOpsResult<bool> {
    let dir = components_dir(repo_root, context).join(component_name);
    if !dir.exists() {
        return Ok(false);
    }
    tokio::fs::remove_dir_all(&dir).await?;
    write_components_kustomization(repo_root, context).await?;
    Ok(true)
}

/// Rewrite `components/kustomization.yaml` to list every component base.
pub async fn write_components_kustomization(repo_root: &Path, context: &str) -> GitOpsResult<()> {
    let dir = components_dir(repo_root, context);
    tokio::fs::create_dir_all(&dir).await?;

    let mut resources = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().join(BASE_DIR).is_dir() {
            resources.push(format!(
                "{}/{}",
                entry.file_name().to_string_lossy(),
                BASE_DIR
            ));
        }
    }
    resources.sort();

    let content = serde_yaml::to_string(&Kustomization::new(resources))?;
    tokio::fs::write(dir.join("kustomization.yaml"), content).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    pub(crate) fn component(name: &str, port: Option<i32>) -> GitOpsComponent {
        let labels = BTreeMap::from([("app.kubernetes.io/instance".to_string(), name.to_string())]);
        GitOpsComponent {
            name: name.to_string(),
            application: "shop".to_string(),
            namespace: "team-a".to_string(),
            deployment: Deployment {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    labels: Some(labels.clone()),
                    ..Default::default()
                },
                spec: Some(DeploymentSpec {
                    selector: LabelSelector {
                        match_labels: Some(labels),
                        ..Default::default()
                    },
                    template: PodTemplateSpec {
                        metadata: None,
                        spec: Some(PodSpec {
                            containers: vec![Container {
                                name: "main".to_string(),
                                image: Some("quay.io/org/img".to_string()),
                                ports: port.map(|p| {
                                    vec![ContainerPort {
                                        container_port: p,
                                        ..Default::default()
                                    }]
                                }),
                                ..Default::default()
                            }],
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
                status: None,
            },
            route: Some("shop.example.com".to_string()),
            annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn test_render_with_port() {
        let files = render_component(&component("backend", Some(8080))).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec!["deployment.yaml", "service.yaml", "route.yaml", "kustomization.yaml"]
        );

        let route = &files[2].content;
        assert!(route.contains("host: shop.example.com"));
        assert!(route.contains("targetPort: 8080"));

        let kustomization = &files[3].content;
        assert!(kustomization.contains("- deployment.yaml"));
        assert!(kustomization.contains("- route.yaml"));
    }

    #[test]
    fn test_render_without_port() {
        let files = render_component(&component("worker", None)).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["deployment.yaml", "kustomization.yaml"]);
    }

    #[test]
    fn test_component_dir() {
        let root = Path::new("/repo");
        assert_eq!(
            component_dir(root, "/", "backend"),
            PathBuf::from("/repo/components/backend/base")
        );
        assert_eq!(
            component_dir(root, "./envs/dev/", "backend"),
            PathBuf::from("/repo/envs/dev/components/backend/base")
        );
    }

    #[tokio::test]
    async fn test_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        write_component(dir.path(), "/", &component("backend", Some(8080)))
            .await
            .unwrap();
        write_component(dir.path(), "/", &component("frontend", None))
            .await
            .unwrap();

        let parent = std::fs::read_to_string(dir.path().join("components/kustomization.yaml")).unwrap();
        assert!(parent.contains("- backend/base"));
        assert!(parent.contains("- frontend/base"));

        assert!(remove_component(dir.path(), "/", "backend").await.unwrap());
        assert!(!remove_component(dir.path(), "/", "backend").await.unwrap());
        let parent = std::fs::read_to_string(dir.path().join("components/kustomization.yaml")).unwrap();
        assert!(!parent.contains("backend"));
        assert!(!dir.path().join("components/backend").exists());
    }
}
