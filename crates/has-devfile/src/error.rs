//! Devfile errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevfileError {
    #[error("unable to parse devfile: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("schemaVersion not present in devfile")]
    MissingSchemaVersion,

    #[error("attribute {key} has type {found}, expected {expected}")]
    AttributeType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid quantity {value:?}: {message}")]
    InvalidQuantity { value: String, message: String },

    #[error("devfile has no kubernetes component")]
    NoKubernetesComponent,

    #[error("invalid kubernetes manifest in component {component}: {message}")]
    InvalidManifest { component: String, message: String },
}

pub type DevfileResult<T> = std::result::Result<T, DevfileError>;

impl From<DevfileError> for has_core::Error {
    fn from(err: DevfileError) -> Self {
        has_core::Error::Validation(err.to_string())
    }
}
