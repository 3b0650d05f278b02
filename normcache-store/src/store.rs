use normcache_types::{EntityId, EntityKey, RefSource};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::{
    BucketSnapshot, Clock, Entity, EntityMeta, EntitySnapshot, Fields, PatchTable, RemovalSet,
    StoreSnapshot, SystemClock,
};

type Bucket = BTreeMap<EntityId, Entity>;
type MergeCallback = Box<dyn FnMut() + Send>;

/// Handle returned by [`EntitiesStore::add_on_merge_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// The canonical entity table.
///
/// Reads hand out the live stored record. Mutation only happens through the
/// store's own entry points, each of which notifies the registered callbacks
/// once after all of its changes are applied.
pub struct EntitiesStore {
    buckets: BTreeMap<EntityKey, Bucket>,
    callbacks: Vec<(CallbackId, MergeCallback)>,
    next_callback: u64,
    clock: Arc<dyn Clock>,
}

impl Default for EntitiesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntitiesStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitiesStore")
            .field("buckets", &self.buckets.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl EntitiesStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: BTreeMap::new(),
            callbacks: Vec::new(),
            next_callback: 0,
            clock,
        }
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> normcache_types::Timestamp {
        self.clock.now()
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Shallow-merges incoming records: present fields overwrite, the rest
    /// of an existing record is kept.
    pub fn merge(&mut self, incoming: PatchTable) {
        self.merge_with(incoming, |_, target, source| {
            for (field, value) in source {
                target.insert(field, value);
            }
        });
    }

    /// Merges incoming records, folding fields into existing records with
    /// `merge_fields(type, existing, incoming)`.
    ///
    /// New records take the patch metadata as-is, or fresh metadata when the
    /// patch carries none. Existing records keep `created_at`, get
    /// `updated_at`/`accessed_at` refreshed, and union in the patch tags.
    pub fn merge_with<F>(&mut self, incoming: PatchTable, mut merge_fields: F)
    where
        F: FnMut(&EntityKey, &mut Fields, Fields),
    {
        let now = self.clock.now();
        let mut touched = 0usize;

        for (key, patches) in incoming {
            let bucket = self.buckets.entry(key.clone()).or_default();
            for (id, patch) in patches {
                touched += 1;
                match bucket.get_mut(&id) {
                    Some(existing) => {
                        merge_fields(&key, existing.fields_mut(), patch.fields);
                        let meta = existing.meta_mut();
                        meta.updated_at = now;
                        meta.accessed_at = now;
                        if let Some(incoming_meta) = patch.meta {
                            meta.ref_sources.extend(incoming_meta.ref_sources);
                        }
                    }
                    None => {
                        let meta = patch.meta.unwrap_or_else(|| EntityMeta::new(now));
                        bucket.insert(id, Entity::new(patch.fields, meta));
                    }
                }
            }
        }

        debug!(entities = touched, "Merged entities");
        self.notify();
    }

    /// Deletes one entity.
    pub fn remove(&mut self, key: &str, id: &EntityId) {
        if let Some(bucket) = self.buckets.get_mut(key) {
            bucket.remove(id);
        }
        self.notify();
    }

    /// Deletes every listed entity.
    pub fn remove_many(&mut self, removals: &RemovalSet) {
        let mut removed = 0usize;
        for (key, ids) in removals {
            if let Some(bucket) = self.buckets.get_mut(key) {
                for id in ids {
                    if bucket.remove(id).is_some() {
                        removed += 1;
                    }
                }
            }
        }
        debug!(removed, "Removed entities");
        self.notify();
    }

    /// Clears one bucket, or every bucket when `key` is `None`.
    pub fn reset(&mut self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.buckets.remove(key);
                debug!(entity_key = key, "Reset bucket");
            }
            None => {
                self.buckets.clear();
                debug!("Reset all buckets");
            }
        }
        self.notify();
    }

    /// Drops one reference-source tag from an entity and returns how many
    /// tags remain, or `None` if the entity does not exist.
    ///
    /// Fires no callback; callers batch their removals into
    /// [`EntitiesStore::remove_many`].
    pub fn remove_ref_source(&mut self, key: &str, id: &EntityId, source: &RefSource) -> Option<usize> {
        let entity = self.buckets.get_mut(key)?.get_mut(id)?;
        let meta = entity.meta_mut();
        meta.ref_sources.remove(source);
        Some(meta.ref_sources.len())
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Returns the live record and refreshes its `accessed_at`.
    pub fn get_entity(&mut self, key: &str, id: &EntityId) -> Option<&Entity> {
        let now = self.clock.now();
        let entity = self.buckets.get_mut(key)?.get_mut(id)?;
        entity.meta_mut().accessed_at = now;
        Some(&*entity)
    }

    /// Returns the live record without touching its metadata.
    #[must_use]
    pub fn peek(&self, key: &str, id: &EntityId) -> Option<&Entity> {
        self.buckets.get(key)?.get(id)
    }

    #[must_use]
    pub fn has_entity(&self, key: &str, id: &EntityId) -> bool {
        self.peek(key, id).is_some()
    }

    /// Every record of a type. Order is unspecified.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&Entity> {
        self.buckets
            .get(key)
            .map(|bucket| bucket.values().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn get_count(&self, key: &str) -> usize {
        self.buckets.get(key).map_or(0, BTreeMap::len)
    }

    /// Every `(type, id)` whose tag set is empty.
    #[must_use]
    pub fn orphans(&self) -> RemovalSet {
        let mut out = RemovalSet::new();
        for (key, bucket) in &self.buckets {
            for (id, entity) in bucket {
                if entity.meta().is_orphan() {
                    out.entry(key.clone()).or_default().insert(id.clone());
                }
            }
        }
        out
    }

    // ── Snapshots ────────────────────────────────────────────────

    /// Copy of all business fields, without metadata.
    #[must_use]
    pub fn get_snapshot(&self) -> BTreeMap<EntityKey, BTreeMap<EntityId, Fields>> {
        self.buckets
            .iter()
            .map(|(key, bucket)| {
                let records = bucket
                    .iter()
                    .map(|(id, entity)| (id.clone(), entity.fields().clone()))
                    .collect();
                (key.clone(), records)
            })
            .collect()
    }

    #[must_use]
    pub fn get_snapshot_keys(&self) -> Vec<EntityKey> {
        self.buckets.keys().cloned().collect()
    }

    /// Copy of one bucket with metadata rendered for persistence. A missing
    /// bucket yields an empty map.
    #[must_use]
    pub fn get_snapshot_by_key(&self, key: &str) -> BucketSnapshot {
        self.buckets
            .get(key)
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|(id, entity)| {
                        let snapshot = EntitySnapshot {
                            fields: entity.fields().clone(),
                            metadata: entity.meta().into(),
                        };
                        (id.clone(), snapshot)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every bucket with metadata, in the shape hydration accepts.
    #[must_use]
    pub fn export_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot::new(
            self.buckets
                .keys()
                .map(|key| (key.clone(), self.get_snapshot_by_key(key.as_str())))
                .collect(),
        )
    }

    // ── Callbacks ────────────────────────────────────────────────

    /// Registers a callback fired after every mutating call, in registration
    /// order.
    pub fn add_on_merge_callback<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut() + Send + 'static,
    {
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Unregisters a callback. Returns false if it was not registered.
    pub fn remove_on_merge_callback(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(cb_id, _)| *cb_id != id);
        self.callbacks.len() != before
    }

    fn notify(&mut self) {
        for (_, callback) in &mut self.callbacks {
            callback();
        }
    }
}
