use normcache_model::{SchemaRegistry, SchemaWalker};
use normcache_store::{EntitiesStore, RemovalSet};
use normcache_types::{EntityId, EntityKey, RefSource};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::{EngineError, EngineResult};

/// Reference-counted cascading removal.
///
/// Releasing a tag from a set of roots removes every entity whose tag set
/// becomes empty, then follows that entity's foreign keys and releases the
/// same tag from its children. Entities that keep another tag survive and
/// stop the cascade.
#[derive(Debug, Clone)]
pub struct EntityCleanerStore {
    registry: Arc<SchemaRegistry>,
}

impl EntityCleanerStore {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// Fixes the root type of every later call. Fails if the type has no
    /// schema.
    pub fn bind(&self, entity_key: &str) -> EngineResult<BoundCleaner> {
        if !self.registry.contains(entity_key) {
            return Err(EngineError::UnknownEntityKey(entity_key.to_string()));
        }
        Ok(BoundCleaner {
            cleaner: self.clone(),
            entity_key: EntityKey::from(entity_key),
        })
    }

    /// Releases `source` from the given roots and cascades.
    ///
    /// Traversal is breadth-first with a per-call visited set, so diamonds
    /// are handled once and cycles terminate. The store sees a single
    /// `remove_many`, and none at all when nothing became unreferenced.
    /// Returns what was removed.
    pub fn delete_cascade(
        &self,
        store: &mut EntitiesStore,
        root_key: &str,
        root_ids: &[EntityId],
        source: &RefSource,
    ) -> RemovalSet {
        let walker = SchemaWalker::new(&self.registry);
        let root = EntityKey::from(root_key);

        let mut queue: VecDeque<(EntityKey, EntityId)> =
            root_ids.iter().map(|id| (root.clone(), id.clone())).collect();
        let mut visited: HashSet<(EntityKey, EntityId)> = HashSet::new();
        let mut pending = RemovalSet::new();
        let mut survivors = 0usize;

        while let Some((key, id)) = queue.pop_front() {
            if !visited.insert((key.clone(), id.clone())) {
                continue;
            }

            let Some(remaining) = store.remove_ref_source(key.as_str(), &id, source) else {
                continue;
            };
            if remaining > 0 {
                survivors += 1;
                continue;
            }

            if let Some(entity) = store.peek(key.as_str(), &id) {
                walker.walk_fields(key.as_str(), entity.fields(), |child_key, child_id| {
                    let child = (child_key.clone(), child_id);
                    if !visited.contains(&child) {
                        queue.push_back(child);
                    }
                });
            }
            pending.entry(key).or_default().insert(id);
        }

        let removed: usize = pending.values().map(|ids| ids.len()).sum();
        debug!(
            entity_key = root_key,
            source = %source,
            roots = root_ids.len(),
            removed,
            survivors,
            "Cascade complete"
        );

        if !pending.is_empty() {
            store.remove_many(&pending);
        }
        pending
    }
}

/// A cleaner fixed to one root type.
#[derive(Debug, Clone)]
pub struct BoundCleaner {
    cleaner: EntityCleanerStore,
    entity_key: EntityKey,
}

impl BoundCleaner {
    #[must_use]
    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }

    pub fn delete_cascade(
        &self,
        store: &mut EntitiesStore,
        root_ids: &[EntityId],
        source: &RefSource,
    ) -> RemovalSet {
        self.cleaner
            .delete_cascade(store, self.entity_key.as_str(), root_ids, source)
    }
}
