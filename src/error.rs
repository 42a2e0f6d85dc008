//! Error types for the schema engine

use thiserror::Error;

use crate::form::ValidationError;
use crate::linker::LinkerErrors;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema engine errors
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Malformed caller input, surfaced verbatim
    #[error("{0}")]
    ProvidedData(String),

    #[error("Invalid schema key '{key}': must match {pattern}")]
    InvalidKey { key: String, pattern: String },

    #[error("{message}")]
    Conflict { message: String, names: Vec<String> },

    #[error("Duplicate property names: {}", .0.join(", "))]
    DuplicateProperties(Vec<String>),

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Form configuration is invalid ({} error(s))", .0.len())]
    BatchValidation(Vec<ValidationError>),

    #[error("Record linker '{}' has invalid field mappings", .0.record_definition_key)]
    RecordLinker(LinkerErrors),

    #[error("Data requirement violated: {0}")]
    ConstraintViolation(String),

    /// Failure reported by the backing store
    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl SchemaError {
    pub(crate) fn schema_not_found(key: impl Into<String>) -> Self {
        SchemaError::NotFound {
            kind: "Schema",
            key: key.into(),
        }
    }

    /// Offending names for conflict-style errors, empty otherwise
    pub fn names(&self) -> &[String] {
        match self {
            SchemaError::Conflict { names, .. } => names,
            SchemaError::DuplicateProperties(names) => names,
            _ => &[],
        }
    }
}
