//! Serialization-friendly snapshots of the entity table.
//!
//! Wire shape: type → id → `{...fields, "metadata": {createdAt, updatedAt,
//! accessedAt, refSources: [..]}}`.

use normcache_types::{EntityId, EntityKey, RefSource, Timestamp};
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::{EntityMeta, Fields, StoreError, StoreResult};

/// Key the metadata is written under, beside the business fields. An entity
/// with a business field of this name cannot be persisted.
pub const METADATA_KEY: &str = "metadata";

/// Metadata with the tag set rendered as a sorted list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetaSnapshot {
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub accessed_at: Timestamp,
    pub ref_sources: Vec<RefSource>,
}

impl From<&EntityMeta> for MetaSnapshot {
    fn from(meta: &EntityMeta) -> Self {
        Self {
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            accessed_at: meta.accessed_at,
            ref_sources: meta.ref_sources.iter().cloned().collect(),
        }
    }
}

impl From<MetaSnapshot> for EntityMeta {
    fn from(snapshot: MetaSnapshot) -> Self {
        Self {
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            accessed_at: snapshot.accessed_at,
            ref_sources: snapshot.ref_sources.into_iter().collect(),
        }
    }
}

/// One entity as persisted.
///
/// Serializing an entity whose fields contain [`METADATA_KEY`] fails instead
/// of writing the key twice.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EntitySnapshot {
    #[serde(flatten)]
    pub fields: Fields,
    #[serde(default)]
    pub metadata: MetaSnapshot,
}

impl EntitySnapshot {
    #[must_use]
    pub fn has_reserved_field(&self) -> bool {
        self.fields.contains_key(METADATA_KEY)
    }
}

impl Serialize for EntitySnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.has_reserved_field() {
            return Err(S::Error::custom(format!(
                "business field `{METADATA_KEY}` collides with the snapshot metadata key"
            )));
        }
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (field, value) in &self.fields {
            map.serialize_entry(field, value)?;
        }
        map.serialize_entry(METADATA_KEY, &self.metadata)?;
        map.end()
    }
}

/// One bucket as persisted.
pub type BucketSnapshot = BTreeMap<EntityId, EntitySnapshot>;

/// The whole table as persisted, and the input of hydration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreSnapshot {
    buckets: BTreeMap<EntityKey, BucketSnapshot>,
}

impl StoreSnapshot {
    #[must_use]
    pub fn new(buckets: BTreeMap<EntityKey, BucketSnapshot>) -> Self {
        Self { buckets }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&BucketSnapshot> {
        self.buckets.get(key)
    }

    pub fn insert(&mut self, key: impl Into<EntityKey>, bucket: BucketSnapshot) {
        self.buckets.insert(key.into(), bucket);
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&EntityKey, &BucketSnapshot)> {
        self.buckets.iter()
    }

    #[must_use]
    pub fn into_buckets(self) -> BTreeMap<EntityKey, BucketSnapshot> {
        self.buckets
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Writes the snapshot as JSON text. Fails with
    /// [`StoreError::ReservedField`] naming the first entity that carries a
    /// business field called [`METADATA_KEY`].
    pub fn to_json(&self) -> StoreResult<String> {
        self.check_reserved_fields()?;
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn check_reserved_fields(&self) -> StoreResult<()> {
        for (key, bucket) in &self.buckets {
            if let Some((id, _)) = bucket.iter().find(|(_, entity)| entity.has_reserved_field()) {
                return Err(StoreError::ReservedField {
                    entity_key: key.to_string(),
                    id: id.to_string(),
                    field: METADATA_KEY.to_string(),
                });
            }
        }
        Ok(())
    }
}
