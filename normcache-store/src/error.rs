//! Error types for the store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// Only snapshot text conversion can fail; every table operation is
/// infallible.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An entity carries a business field under a key the snapshot format
    /// reserves.
    #[error("entity {entity_key}/{id} has a business field named `{field}`, which snapshots reserve")]
    ReservedField {
        entity_key: String,
        id: String,
        field: String,
    },
}
