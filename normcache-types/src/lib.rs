//! Core type definitions for the normalized entity cache.
//!
//! This crate defines the small vocabulary shared by every other crate:
//! - Entity type tags and entity identifiers
//! - Reference-source tags that keep entities alive
//! - Millisecond wall-clock timestamps used for entity metadata
//!
//! Schemas, normalization, storage and garbage collection live in their own
//! crates and only agree on these types.

mod ids;
mod ref_source;
mod timestamp;

pub use ids::{EntityId, EntityKey};
pub use ref_source::RefSource;
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid entity id: {0}")]
    InvalidId(String),
}
