//! Entity schemas and normalization for the normalized entity cache.
//!
//! Defines the types every other crate agrees on when it needs to understand
//! the shape of the entity graph:
//! - [`EntitySchema`]: one entity type with its id rule,, relations, process/merge strategies
//! - [`SchemaRegistry`]: every schema of an application, keyed by type tag
//! - [`CacheConfig`]: naming conventions shared by the normalizer and the walker
//! - [`Payload`]: an arena of payload object nodes, possibly shared or cyclic
//! - [`Normalizer`]: flattens a payload into per-type entity tables
//! - [`SchemaWalker`]: reads the foreign keys the normalizer wrote back as edges
//!
//! Normalizer and walker are pure functions over their inputs; they never
//! hold state between calls.

mod config;
mod error;
mod normalize;
mod payload;
mod registry;
mod schema;
mod walker;

pub use config::CacheConfig;
pub use error::{ModelError, ModelResult};
pub use normalize::{EntityTable, NormalizedOutput, Normalizer};
pub use payload::{NodeId, Payload, PayloadBuilder, Slot};
pub use registry::SchemaRegistry;
pub use schema::{
    EntityLookup, EntityModel, EntitySchema, IdAttribute, MergeStrategy, ProcessStrategy, Relation,
};
pub use walker::SchemaWalker;

/// Business fields of a single entity record.
pub type Fields = serde_json::Map<String, serde_json::Value>;
