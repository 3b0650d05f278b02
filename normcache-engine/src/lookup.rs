use normcache_model::{EntityLookup, Fields};
use normcache_store::{EntitiesStore, Entity};
use normcache_types::{EntityId, EntityKey};

/// Read-only view of a store handed to model constructors.
///
/// Reads go through [`EntitiesStore::peek`] and leave access times alone.
#[derive(Debug, Clone, Copy)]
pub struct StoreLookup<'s> {
    store: &'s EntitiesStore,
}

impl<'s> StoreLookup<'s> {
    pub fn new(store: &'s EntitiesStore) -> Self {
        Self { store }
    }
}

impl EntityLookup for StoreLookup<'_> {
    fn lookup(&self, key: &EntityKey, id: &EntityId) -> Option<&Fields> {
        self.store.peek(key.as_str(), id).map(Entity::fields)
    }
}
