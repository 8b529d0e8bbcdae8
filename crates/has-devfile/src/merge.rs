//! Writing a Component's Spec into its devfile.

use crate::attributes::{Attributes, EnvEntry};
use crate::error::{DevfileError, DevfileResult};
use crate::model::Devfile;
use crate::quantity;
use crate::stub::ComponentAttributes;
use has_core::api::ComponentSpec;
use has_core::keys;
use k8s_openapi::api::core::v1::ResourceRequirements;

/// Rewrite the first kubernetes component's attributes to match `spec`.
///
/// An empty route, env list or resource entry removes the matching attribute.
/// Replicas and target port left unset keep whatever the devfile already had.
/// Pre-existing values of the wrong type under a reserved key and quantities
/// that fail to canonicalize are errors. Returns true when the devfile
/// changed.
pub fn apply_component_spec(devfile: &mut Devfile, spec: &ComponentSpec) -> DevfileResult<bool> {
    let mut changed = false;

    if let Some(dockerfile_url) = spec
        .git_source()
        .and_then(|git| git.dockerfile_url.as_deref())
        .filter(|url| !url.is_empty())
    {
        for component in devfile.image_components_mut() {
            let Some(dockerfile) = component
                .image
                .as_mut()
                .and_then(|image| image.dockerfile.as_mut())
            else {
                continue;
            };
            if dockerfile.has_relative_uri() {
                dockerfile.uri = Some(dockerfile_url.to_string());
                dockerfile.build_context = Some("./".to_string());
                changed = true;
            }
        }
    }

    let component = devfile
        .first_kubernetes_component_mut()
        .ok_or(DevfileError::NoKubernetesComponent)?;
    let attributes = &mut component.attributes;

    ComponentAttributes::read(attributes)?;

    changed |= match spec.route.as_deref().filter(|r| !r.is_empty()) {
        Some(route) => attributes.set_string(keys::ATTR_ROUTE, route),
        None => attributes.remove(keys::ATTR_ROUTE),
    };
    if let Some(replicas) = spec.replicas {
        changed |= attributes.set_number(keys::ATTR_REPLICAS, i64::from(replicas));
    }
    if spec.target_port != 0 {
        changed |= attributes.set_number(keys::ATTR_CONTAINER_IMAGE_PORT, i64::from(spec.target_port));
    }
    if spec.env.is_empty() {
        changed |= attributes.remove(keys::ATTR_CONTAINER_ENV);
    } else {
        let entries: Vec<EnvEntry> = spec
            .env
            .iter()
            .map(|var| EnvEntry {
                name: var.name.clone(),
                value: var.value.clone().unwrap_or_default(),
            })
            .collect();
        changed |= attributes.set_env(keys::ATTR_CONTAINER_ENV, &entries);
    }
    changed |= apply_resources(attributes, spec.resources.as_ref())?;

    Ok(changed)
}

fn apply_resources(
    attributes: &mut Attributes,
    resources: Option<&ResourceRequirements>,
) -> DevfileResult<bool> {
    let mut changed = false;
    for (resource, limit_key, request_key) in keys::RESOURCE_ATTRIBUTES {
        let pairs = [
            (resources.and_then(|r| r.limits.as_ref()), limit_key),
            (resources.and_then(|r| r.requests.as_ref()), request_key),
        ];
        for (values, key) in pairs {
            changed |= match values.and_then(|v| v.get(resource)) {
                Some(value) => {
                    let canonical = quantity::canonicalize(&value.0)?;
                    attributes.set_string(key, &canonical)
                }
                None => attributes.remove(key),
            };
        }
    }
    Ok(changed)
}
