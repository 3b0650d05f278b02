//! In-memory entity table for the normalized entity cache.
//!
//! [`EntitiesStore`] is the single owner of every cached entity. It keeps one
//! bucket per entity type, attaches [`EntityMeta`] bookkeeping to each
//! record, and is the only place where records or their reference-source
//! sets are mutated.
//!
//! # Architecture
//!
//! - Records are `serde_json` field maps; metadata sits beside them and never
//!   shows up in business-field equality or serialization
//! - Every mutating call notifies registered callbacks exactly once
//! - Snapshots render metadata into a serialization-friendly shape so that a
//!   store can be persisted and later hydrated

mod clock;
mod entity;
mod error;
mod snapshot;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{Entity, EntityMeta, EntityPatch, PatchTable, RemovalSet};
pub use error::{StoreError, StoreResult};
pub use snapshot::{BucketSnapshot, EntitySnapshot, METADATA_KEY, MetaSnapshot, StoreSnapshot};
pub use store::{CallbackId, EntitiesStore};

/// Business fields of a single entity record.
pub type Fields = serde_json::Map<String, serde_json::Value>;
