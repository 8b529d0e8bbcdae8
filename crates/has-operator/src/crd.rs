//! Custom resource definitions served by the operator.

use has_core::api::{Application, Component, ComponentDetectionQuery, SPIFileContentRequest};
use kube::CustomResourceExt;

/// The four CRDs as a multi-document YAML stream.
pub fn render() -> Result<String, serde_yaml::Error> {
    let crds = [
        Application::crd(),
        Component::crd(),
        ComponentDetectionQuery::crd(),
        SPIFileContentRequest::crd(),
    ];
    let mut out = String::new();
    for crd in &crds {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(crd)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let yaml = render().unwrap();
        assert_eq!(yaml.matches("---\n").count(), 4);
        for name in [
            "applications.appstudio.redhat.com",
            "components.appstudio.redhat.com",
            "componentdetectionqueries.appstudio.redhat.com",
            "spifilecontentrequests.appstudio.redhat.com",
        ] {
            assert!(yaml.contains(name), "missing {name}");
        }
    }
}
