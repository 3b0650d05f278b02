use normcache_model::{EntitySchema, Fields, SchemaRegistry};
use normcache_store::{CallbackId, EntitiesStore, Entity, RemovalSet, StoreSnapshot};
use normcache_types::{EntityId, EntityKey, RefSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::{EntityCleanerStore, EntityProcessor, ProcessRequest};

/// A store together with the processor and cleaner that maintain it.
#[derive(Debug)]
pub struct EntityCache {
    store: EntitiesStore,
    processor: EntityProcessor,
    cleaner: EntityCleanerStore,
}

impl EntityCache {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_store(registry, EntitiesStore::new())
    }

    /// Wraps an existing store, for example one built with a custom clock.
    pub fn with_store(registry: Arc<SchemaRegistry>, store: EntitiesStore) -> Self {
        Self {
            store,
            processor: EntityProcessor::new(Arc::clone(&registry)),
            cleaner: EntityCleanerStore::new(registry),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        self.processor.registry()
    }

    #[must_use]
    pub fn store(&self) -> &EntitiesStore {
        &self.store
    }

    pub fn process(&mut self, request: ProcessRequest<'_>) -> Vec<EntityId> {
        self.processor.process(&mut self.store, request)
    }

    pub fn hydrate(&mut self, snapshot: Option<&StoreSnapshot>) {
        self.processor.hydrate(&mut self.store, snapshot);
    }

    pub fn delete_cascade(
        &mut self,
        root_key: &str,
        root_ids: &[EntityId],
        source: &RefSource,
    ) -> RemovalSet {
        self.cleaner
            .delete_cascade(&mut self.store, root_key, root_ids, source)
    }

    /// Reads one entity and refreshes its access time.
    pub fn get(&mut self, key: &str, id: &EntityId) -> Option<&Entity> {
        self.store.get_entity(key, id)
    }

    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&Entity> {
        self.store.get_all(key)
    }

    #[must_use]
    pub fn get_count(&self, key: &str) -> usize {
        self.store.get_count(key)
    }

    #[must_use]
    pub fn get_schema(&self, key: &str) -> Option<&EntitySchema> {
        self.registry().get(key)
    }

    #[must_use]
    pub fn get_snapshot(&self) -> BTreeMap<EntityKey, BTreeMap<EntityId, Fields>> {
        self.store.get_snapshot()
    }

    #[must_use]
    pub fn export_snapshot(&self) -> StoreSnapshot {
        self.store.export_snapshot()
    }

    pub fn reset(&mut self) {
        self.store.reset(None);
    }

    pub fn reset_key(&mut self, key: &str) {
        self.store.reset(Some(key));
    }

    pub fn add_on_merge_callback<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut() + Send + 'static,
    {
        self.store.add_on_merge_callback(callback)
    }

    pub fn remove_on_merge_callback(&mut self, id: CallbackId) -> bool {
        self.store.remove_on_merge_callback(id)
    }

    /// Removes every entity with an empty tag set in one `remove_many`.
    ///
    /// Children of swept entities are not followed; they are swept only if
    /// they are untagged themselves.
    pub fn sweep_orphans(&mut self) -> RemovalSet {
        let orphans = self.store.orphans();
        if orphans.is_empty() {
            return orphans;
        }
        let count: usize = orphans.values().map(|ids| ids.len()).sum();
        debug!(removed = count, "Sweeping orphaned entities");
        self.store.remove_many(&orphans);
        orphans
    }
}
