//! Deployment synthesis and rendering.
//!
//! Devfiles without a kubernetes component get one generated here. The same
//! code renders the final Deployment written to the GitOps repository.

use crate::error::{DevfileError, DevfileResult};
use crate::model::{
    DOCKERFILE_COMPONENT_NAME, Devfile, DevfileComponent, DockerfileImage, Endpoint,
    ImageComponent, KUBERNETES_COMPONENT_NAME, KubernetesComponent,
};
use crate::stub::ComponentAttributes;
use has_core::keys;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    TCPSocketAction,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;
use serde_yaml::Mapping;
use std::collections::BTreeMap;

pub const DEFAULT_REPLICAS: i32 = 3;

const PROBE_INITIAL_DELAY_SECONDS: i32 = 10;
const PROBE_PERIOD_SECONDS: i32 = 10;

/// Inputs for building a Deployment for one component.
#[derive(Debug, Clone, Default)]
pub struct DeploymentParams {
    pub component_name: String,
    pub application: String,
    pub namespace: String,
    pub image: String,
    pub port: Option<i32>,
    pub replicas: Option<i32>,
    pub env: Vec<EnvVar>,
    pub resources: Option<ResourceRequirements>,
}

/// Default image location for a component built by the service.
pub fn default_image(registry: &str, namespace: &str, component_name: &str) -> String {
    format!("{registry}:{namespace}-{component_name}")
}

fn labels(params: &DeploymentParams) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        params.component_name.clone(),
    );
    labels.insert(
        "app.kubernetes.io/instance".to_string(),
        params.component_name.clone(),
    );
    if !params.application.is_empty() {
        labels.insert(
            "app.kubernetes.io/part-of".to_string(),
            params.application.clone(),
        );
        labels.insert(
            keys::LABEL_APPLICATION.to_string(),
            params.application.clone(),
        );
    }
    labels.insert(
        keys::LABEL_COMPONENT.to_string(),
        params.component_name.clone(),
    );
    labels
}

fn selector_labels(component_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(
        "app.kubernetes.io/instance".to_string(),
        component_name.to_string(),
    )])
}

fn tcp_probe(port: i32) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(PROBE_INITIAL_DELAY_SECONDS),
        period_seconds: Some(PROBE_PERIOD_SECONDS),
        ..Default::default()
    }
}

/// Build a Deployment from scratch.
pub fn synthesize_deployment(params: &DeploymentParams) -> Deployment {
    let labels = labels(params);
    let container = Container {
        name: "container-image".to_string(),
        image: Some(params.image.clone()),
        image_pull_policy: Some("Always".to_string()),
        ports: params.port.map(|port| {
            vec![ContainerPort {
                container_port: port,
                ..Default::default()
            }]
        }),
        env: (!params.env.is_empty()).then(|| params.env.clone()),
        resources: params.resources.clone(),
        liveness_probe: params.port.map(tcp_probe),
        readiness_probe: params.port.map(tcp_probe),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(params.component_name.clone()),
            namespace: (!params.namespace.is_empty()).then(|| params.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(params.replicas.unwrap_or(DEFAULT_REPLICAS)),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&params.component_name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// A devfile kubernetes component embedding a synthesized Deployment.
pub fn kubernetes_component(params: &DeploymentParams) -> DevfileResult<DevfileComponent> {
    let deployment = synthesize_deployment(params);
    let inlined = serde_yaml::to_string(&deployment)?;
    let endpoints = params
        .port
        .map(|port| {
            vec![Endpoint {
                name: format!("port-{port}"),
                target_port: port,
                extra: Mapping::new(),
            }]
        })
        .unwrap_or_default();

    Ok(DevfileComponent {
        name: KUBERNETES_COMPONENT_NAME.to_string(),
        kubernetes: Some(KubernetesComponent {
            inlined: Some(inlined),
            endpoints,
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Add a synthesized kubernetes component when the devfile has none.
/// Returns true when one was added.
pub fn ensure_kubernetes_component(
    devfile: &mut Devfile,
    params: &DeploymentParams,
) -> DevfileResult<bool> {
    if devfile.has_kubernetes_component() {
        return Ok(false);
    }
    devfile.components.push(kubernetes_component(params)?);
    Ok(true)
}

/// Minimal devfile for a component deployed from a prebuilt image.
pub fn container_image_devfile(params: &DeploymentParams) -> DevfileResult<Devfile> {
    let mut devfile = Devfile::new(&params.component_name);
    devfile.components.push(kubernetes_component(params)?);
    Ok(devfile)
}

/// Two-component devfile building the given Dockerfile and deploying the
/// result.
pub fn dockerfile_devfile(params: &DeploymentParams, dockerfile_url: &str) -> DevfileResult<Devfile> {
    let mut devfile = Devfile::new(&params.component_name);
    devfile.components.push(DevfileComponent {
        name: DOCKERFILE_COMPONENT_NAME.to_string(),
        image: Some(ImageComponent {
            image_name: params.image.clone(),
            dockerfile: Some(DockerfileImage {
                uri: Some(dockerfile_url.to_string()),
                build_context: Some("./".to_string()),
                root_required: Some(false),
                extra: Mapping::new(),
            }),
            extra: Mapping::new(),
        }),
        ..Default::default()
    });
    devfile.components.push(kubernetes_component(params)?);
    Ok(devfile)
}

/// Find the Deployment in an inlined manifest. Multi-document manifests are
/// allowed; the first Deployment wins.
fn inlined_deployment(component: &str, inlined: &str) -> DevfileResult<Option<Deployment>> {
    for document in serde_yaml::Deserializer::from_str(inlined) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.get("kind").and_then(|k| k.as_str()) != Some("Deployment") {
            continue;
        }
        let deployment = serde_yaml::from_value(value).map_err(|e| DevfileError::InvalidManifest {
            component: component.to_string(),
            message: e.to_string(),
        })?;
        return Ok(Some(deployment));
    }
    Ok(None)
}

/// Render the Deployment for a component from its devfile.
///
/// The first kubernetes component's inlined Deployment is the starting point
/// when present; otherwise one is synthesized. Attribute values (replicas,
/// port, env, resources) take precedence over what the manifest says.
pub fn render_deployment(devfile: &Devfile, params: &DeploymentParams) -> DevfileResult<Deployment> {
    let component = devfile.first_kubernetes_component();
    let attributes = match component {
        Some(c) => ComponentAttributes::read(&c.attributes)?,
        None => ComponentAttributes::default(),
    };

    let mut effective = params.clone();
    if let Some(replicas) = attributes.replicas {
        effective.replicas = Some(replicas);
    }
    if let Some(port) = attributes.target_port {
        effective.port = Some(port);
    } else if effective.port.is_none() {
        effective.port = component
            .and_then(|c| c.kubernetes.as_ref())
            .and_then(|k| k.endpoints.first())
            .map(|e| e.target_port);
    }
    if !attributes.env.is_empty() {
        effective.env = attributes.env.clone();
    }
    if attributes.resources.is_some() {
        effective.resources = attributes.resources.clone();
    }

    let existing = match component.and_then(|c| c.kubernetes.as_ref().map(|k| (c, k))) {
        Some((c, k)) => match k.inlined.as_deref() {
            Some(inlined) => inlined_deployment(&c.name, inlined)?,
            None => None,
        },
        None => None,
    };

    let Some(mut deployment) = existing else {
        return Ok(synthesize_deployment(&effective));
    };

    let labels = labels(&effective);
    deployment.metadata.name = Some(effective.component_name.clone());
    if !effective.namespace.is_empty() {
        deployment.metadata.namespace = Some(effective.namespace.clone());
    }
    deployment
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(labels.clone());

    let spec = deployment.spec.get_or_insert_with(Default::default);
    spec.replicas = Some(
        effective
            .replicas
            .or(spec.replicas)
            .unwrap_or(DEFAULT_REPLICAS),
    );
    if spec.selector.match_labels.is_none() && spec.selector.match_expressions.is_none() {
        spec.selector.match_labels = Some(selector_labels(&effective.component_name));
    }
    spec.template
        .metadata
        .get_or_insert_with(Default::default)
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(labels);

    let pod = spec.template.spec.get_or_insert_with(Default::default);
    if pod.containers.is_empty() {
        pod.containers.push(Container {
            name: "container-image".to_string(),
            ..Default::default()
        });
    }
    let container = &mut pod.containers[0];
    if !effective.image.is_empty() {
        container.image = Some(effective.image.clone());
    }
    if let Some(port) = effective.port {
        let ports = container.ports.get_or_insert_with(Vec::new);
        match ports.first_mut() {
            Some(first) => first.container_port = port,
            None => ports.push(ContainerPort {
                container_port: port,
                ..Default::default()
            }),
        }
        for probe in [&mut container.liveness_probe, &mut container.readiness_probe] {
            if probe.as_ref().is_none_or(|p| p.tcp_socket.is_some()) {
                *probe = Some(tcp_probe(port));
            }
        }
    }
    if !effective.env.is_empty() {
        container.env = Some(effective.env.clone());
    }
    if effective.resources.is_some() {
        container.resources = effective.resources.clone();
    }

    Ok(deployment)
}
