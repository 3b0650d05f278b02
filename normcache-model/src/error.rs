//! Error types for schema and configuration setup.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while assembling schemas or loading configuration.
///
/// Normalization and walking never fail; these only surface at setup time.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No schema is registered under the key.
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    /// Two schemas were registered under the same key.
    #[error("duplicate schema: {0}")]
    DuplicateSchema(String),

    /// A relation points at a type that has no schema.
    #[error("relation {entity_key}.{field} targets unregistered schema {target}")]
    DanglingRelation {
        entity_key: String,
        field: String,
        target: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
