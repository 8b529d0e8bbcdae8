//! Typed access to devfile attribute maps.
//!
//! Attributes are free-form YAML. Readers ask for a specific type and get an
//! error when the stored value has a different one; nothing is coerced.

use crate::error::{DevfileError, DevfileResult};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Mapping);

/// A `name`/`value` pair stored under the container environment attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntry {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "map",
        Value::Tagged(_) => "tagged",
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &Value) -> DevfileError {
    DevfileError::AttributeType {
        key: key.to_string(),
        expected,
        found: type_name(found),
    }
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().filter_map(Value::as_str)
    }

    pub fn get_string(&self, key: &str) -> DevfileResult<Option<String>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(wrong_type(key, "string", other)),
        }
    }

    pub fn get_number(&self, key: &str) -> DevfileResult<Option<i64>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value @ Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "integer", value)),
            Some(other) => Err(wrong_type(key, "integer", other)),
        }
    }

    pub fn get_bool(&self, key: &str) -> DevfileResult<Option<bool>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(wrong_type(key, "bool", other)),
        }
    }

    pub fn get_strings(&self, key: &str) -> DevfileResult<Option<Vec<String>>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(wrong_type(key, "list of strings", other)),
                })
                .collect::<DevfileResult<Vec<_>>>()
                .map(Some),
            Some(other) => Err(wrong_type(key, "list of strings", other)),
        }
    }

    pub fn get_env(&self, key: &str) -> DevfileResult<Option<Vec<EnvEntry>>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value @ Value::Sequence(_)) => serde_yaml::from_value(value.clone())
                .map(Some)
                .map_err(|_| wrong_type(key, "list of name/value pairs", value)),
            Some(other) => Err(wrong_type(key, "list of name/value pairs", other)),
        }
    }

    /// Store `value` under `key`, keeping the key's position if it already
    /// exists. Returns true when the stored value changed.
    pub fn set(&mut self, key: &str, value: Value) -> bool {
        if self.0.get(key) == Some(&value) {
            return false;
        }
        self.0.insert(Value::String(key.to_string()), value);
        true
    }

    pub fn set_string(&mut self, key: &str, value: &str) -> bool {
        self.set(key, Value::String(value.to_string()))
    }

    pub fn set_number(&mut self, key: &str, value: i64) -> bool {
        self.set(key, Value::Number(value.into()))
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> bool {
        self.set(key, Value::Bool(value))
    }

    pub fn set_strings(&mut self, key: &str, values: &[String]) -> bool {
        let seq = values.iter().cloned().map(Value::String).collect();
        self.set(key, Value::Sequence(seq))
    }

    pub fn set_env(&mut self, key: &str, entries: &[EnvEntry]) -> bool {
        let seq = entries
            .iter()
            .map(|entry| {
                let mut map = Mapping::new();
                map.insert("name".into(), entry.name.clone().into());
                map.insert("value".into(), entry.value.clone().into());
                Value::Mapping(map)
            })
            .collect();
        self.set(key, Value::Sequence(seq))
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.0.shift_remove(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Attributes {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_typed_reads() {
        let attrs = parse(
            r#"
appModelRepository.url: https://github.com/org/app
deployment/replicas: 2
skip: true
tags: [a, b]
deployment/container-env:
  - name: FOO
    value: bar
"#,
        );

        assert_eq!(
            attrs.get_string("appModelRepository.url").unwrap().as_deref(),
            Some("https://github.com/org/app")
        );
        assert_eq!(attrs.get_number("deployment/replicas").unwrap(), Some(2));
        assert_eq!(attrs.get_bool("skip").unwrap(), Some(true));
        assert_eq!(
            attrs.get_strings("tags").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            attrs.get_env("deployment/container-env").unwrap(),
            Some(vec![EnvEntry {
                name: "FOO".to_string(),
                value: "bar".to_string()
            }])
        );
        assert_eq!(attrs.get_string("missing").unwrap(), None);
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let attrs = parse("deployment/replicas: \"two\"\nroute: 5\n");

        let err = attrs.get_number("deployment/replicas").unwrap_err();
        assert_eq!(
            err.to_string(),
            "attribute deployment/replicas has type string, expected integer"
        );
        assert!(attrs.get_string("route").is_err());
        assert!(attrs.get_env("route").is_err());
    }

    #[test]
    fn test_fractional_number_is_not_an_integer() {
        let attrs = parse("deployment/replicas: 1.5\n");
        assert!(attrs.get_number("deployment/replicas").is_err());
    }

    #[test]
    fn test_set_reports_changes_and_keeps_order() {
        let mut attrs = parse("a: 1\nb: 2\n");
        assert!(!attrs.set_number("a", 1));
        assert!(attrs.set_number("a", 3));
        assert!(attrs.set_string("c", "x"));

        let keys: Vec<_> = attrs.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        let env = vec![EnvEntry {
            name: "K".to_string(),
            value: "V".to_string(),
        }];
        assert!(attrs.set_env("env", &env));
        assert!(!attrs.set_env("env", &env));
        assert_eq!(attrs.get_env("env").unwrap(), Some(env));

        assert!(attrs.remove("b"));
        assert!(!attrs.remove("b"));
    }
}
