//! Object keys.

use derive_more::Display;
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};

/// Identity of a namespaced object: the unit of work for the reconcilers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{namespace}/{name}")]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object. Cluster-scoped objects get an empty namespace.
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

impl std::str::FromStr for ObjectKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(crate::Error::Validation(format!(
                "expected <namespace>/<name>, got {s:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let key = ObjectKey::new("team-a", "backend");
        assert_eq!(key.to_string(), "team-a/backend");
        assert_eq!("team-a/backend".parse::<ObjectKey>().unwrap(), key);
        assert!("backend".parse::<ObjectKey>().is_err());
        assert!("/backend".parse::<ObjectKey>().is_err());
    }
}
