//! Orchestration layer of the normalized entity cache.
//!
//! Ties the schema registry and the entity table together:
//! - [`EntityProcessor`] normalizes payloads, tags every produced entity with
//!   a reference source and merges the result into the store in one call
//! - [`EntityCleanerStore`] releases a reference source from a set of roots
//!   and cascades removal into children that end up unreferenced
//! - [`EntityCache`] owns a store and exposes both behind one handle
//!
//! Nothing here holds the store itself except [`EntityCache`]; processors and
//! cleaners borrow it per call, so the store keeps a single owner.

mod cache;
mod cleaner;
mod error;
mod lookup;
mod processor;

pub use cache::EntityCache;
pub use cleaner::{BoundCleaner, EntityCleanerStore};
pub use error::{EngineError, EngineResult};
pub use lookup::StoreLookup;
pub use processor::{
    BoundProcessor, EntityProcessor, ProcessRequest, create_entity_processor, create_entity_restorer,
};
