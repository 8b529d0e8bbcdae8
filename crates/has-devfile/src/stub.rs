//! Reading Component settings back out of a devfile.
//!
//! Used when detection turns a devfile into a Component stub, and when
//! rendering GitOps output from the attributes the merge wrote.

use crate::attributes::Attributes;
use crate::error::{DevfileError, DevfileResult};
use crate::model::Devfile;
use crate::quantity;
use has_core::keys;
use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Component settings held in a kubernetes component's attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentAttributes {
    pub target_port: Option<i32>,
    pub replicas: Option<i32>,
    pub route: Option<String>,
    pub env: Vec<EnvVar>,
    pub resources: Option<ResourceRequirements>,
}

fn read_i32(attributes: &Attributes, key: &str) -> DevfileResult<Option<i32>> {
    attributes
        .get_number(key)?
        .map(|n| {
            i32::try_from(n).map_err(|_| DevfileError::AttributeType {
                key: key.to_string(),
                expected: "32-bit integer",
                found: "number",
            })
        })
        .transpose()
}

fn read_quantities(
    attributes: &Attributes,
    limits: bool,
) -> DevfileResult<Option<BTreeMap<String, Quantity>>> {
    let mut out = BTreeMap::new();
    for (resource, limit_key, request_key) in keys::RESOURCE_ATTRIBUTES {
        let key = if limits { limit_key } else { request_key };
        if let Some(value) = attributes.get_string(key)? {
            out.insert(resource.to_string(), Quantity(quantity::canonicalize(&value)?));
        }
    }
    Ok((!out.is_empty()).then_some(out))
}

impl ComponentAttributes {
    /// Read the reserved keys, failing on any value of the wrong type.
    pub fn read(attributes: &Attributes) -> DevfileResult<Self> {
        let target_port = read_i32(attributes, keys::ATTR_CONTAINER_IMAGE_PORT)?;
        let replicas = read_i32(attributes, keys::ATTR_REPLICAS)?;
        let route = attributes.get_string(keys::ATTR_ROUTE)?;
        let env = attributes
            .get_env(keys::ATTR_CONTAINER_ENV)?
            .unwrap_or_default()
            .into_iter()
            .map(|entry| EnvVar {
                name: entry.name,
                value: Some(entry.value),
                value_from: None,
            })
            .collect();

        let limits = read_quantities(attributes, true)?;
        let requests = read_quantities(attributes, false)?;
        let resources = (limits.is_some() || requests.is_some()).then(|| ResourceRequirements {
            limits,
            requests,
            ..Default::default()
        });

        Ok(Self {
            target_port,
            replicas,
            route,
            env,
            resources,
        })
    }
}

/// Extract stub settings from the first kubernetes component of a detected
/// devfile. The first endpoint's port is used when no port attribute is set.
pub fn extract_stub(devfile: &Devfile) -> DevfileResult<ComponentAttributes> {
    let Some(component) = devfile.first_kubernetes_component() else {
        return Ok(ComponentAttributes::default());
    };
    let mut stub = ComponentAttributes::read(&component.attributes)?;
    if stub.target_port.is_none() {
        stub.target_port = component
            .kubernetes
            .as_ref()
            .and_then(|k| k.endpoints.first())
            .map(|e| e.target_port);
    }
    Ok(stub)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETECTED: &str = r#"
schemaVersion: 2.2.0
metadata:
  name: java-springboot
components:
  - name: kubernetes-deploy
    attributes:
      replicas: 2
      route: my-route
      cpuLimit: 1000m
      memoryRequest: 1024Mi
      containerENV:
        - name: PROFILE
          value: dev
    kubernetes:
      uri: deploy.yaml
      endpoints:
        - name: http
          targetPort: 8081
"#;

    #[test]
    fn test_extract_stub() {
        let devfile = Devfile::parse(DETECTED).unwrap();
        let stub = extract_stub(&devfile).unwrap();

        assert_eq!(stub.replicas, Some(2));
        assert_eq!(stub.route.as_deref(), Some("my-route"));
        assert_eq!(stub.target_port, Some(8081));
        assert_eq!(stub.env.len(), 1);
        assert_eq!(stub.env[0].value.as_deref(), Some("dev"));

        let resources = stub.resources.unwrap();
        assert_eq!(
            resources.limits.unwrap()["cpu"],
            Quantity("1".to_string())
        );
        assert_eq!(
            resources.requests.unwrap()["memory"],
            Quantity("1Gi".to_string())
        );
    }

    #[test]
    fn test_extract_stub_wrong_type() {
        let devfile = Devfile::parse(&DETECTED.replace("replicas: 2", "replicas: two")).unwrap();
        let err = extract_stub(&devfile).unwrap_err();
        assert!(err.to_string().contains("replicas"));
    }

    #[test]
    fn test_extract_stub_without_kubernetes_component() {
        let devfile = Devfile::new("empty");
        assert_eq!(extract_stub(&devfile).unwrap(), ComponentAttributes::default());
    }

    #[test]
    fn test_invalid_quantity_attribute() {
        let devfile = Devfile::parse(&DETECTED.replace("cpuLimit: 1000m", "cpuLimit: lots")).unwrap();
        assert!(matches!(
            extract_stub(&devfile),
            Err(DevfileError::InvalidQuantity { .. })
        ));
    }
}
