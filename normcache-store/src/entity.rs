use normcache_types::{EntityId, EntityKey, RefSource, Timestamp};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::Fields;

/// Bookkeeping kept beside every stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMeta {
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub accessed_at: Timestamp,
    /// Reasons the entity is alive. Empty means garbage.
    pub ref_sources: BTreeSet<RefSource>,
}

impl EntityMeta {
    /// Fresh metadata with every timestamp at `now` and no tags.
    #[must_use]
    pub fn new(now: Timestamp) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            accessed_at: now,
            ref_sources: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_ref_source(mut self, source: RefSource) -> Self {
        self.ref_sources.insert(source);
        self
    }

    #[must_use]
    pub fn is_orphan(&self) -> bool {
        self.ref_sources.is_empty()
    }
}

/// A stored entity: business fields plus metadata.
///
/// Equality and serialization cover the business fields only.
#[derive(Debug, Clone)]
pub struct Entity {
    fields: Fields,
    meta: EntityMeta,
}

impl Entity {
    pub(crate) fn new(fields: Fields, meta: EntityMeta) -> Self {
        Self { fields, meta }
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    #[must_use]
    pub fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    /// Reads a single field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether the record is a stub created for a dangling foreign key.
    #[must_use]
    pub fn is_partial(&self, marker: &str) -> bool {
        self.fields.get(marker).and_then(Value::as_bool).unwrap_or(false)
    }

    #[must_use]
    pub fn into_fields(self) -> Fields {
        self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    pub(crate) fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// An incoming record for [`crate::EntitiesStore::merge`].
///
/// `meta` is attached by the processor or restored by hydration; plain
/// merges leave it empty and the store creates fresh metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    pub fields: Fields,
    pub meta: Option<EntityMeta>,
}

impl EntityPatch {
    #[must_use]
    pub fn new(fields: Fields) -> Self {
        Self { fields, meta: None }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: EntityMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl From<Fields> for EntityPatch {
    fn from(fields: Fields) -> Self {
        Self::new(fields)
    }
}

/// Incoming records grouped by type and id.
pub type PatchTable = BTreeMap<EntityKey, BTreeMap<EntityId, EntityPatch>>;

/// Ids to delete, grouped by type.
pub type RemovalSet = BTreeMap<EntityKey, BTreeSet<EntityId>>;
