//! Ingestion of payloads and snapshots into the entity table.
//!
//! Handles two write paths: fresh payloads (normalize, tag, merge) and
//! previously exported snapshots (restore metadata, merge). Both end in a
//! single store merge so that observers are notified once per call.

use normcache_model::{
    EntityLookup, EntitySchema, Fields, Normalizer, Payload, Relation, SchemaRegistry,
};
use normcache_store::{EntitiesStore, EntityMeta, EntityPatch, PatchTable, StoreSnapshot};
use normcache_types::{EntityId, EntityKey, RefSource};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::{EngineError, EngineResult, StoreLookup};

/// One ingestion call.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRequest<'a> {
    /// The payload; its root is a single object or a list of objects.
    pub data: &'a Payload,
    /// Type tag of the root objects.
    pub entity_key: &'a str,
    /// Identifies the consumer holding the produced entities alive.
    pub source_ref_id: &'a str,
    /// Whether the consumer is a collection (`collection:` tag) or a single
    /// record (`record:` tag).
    pub is_collection: bool,
}

impl<'a> ProcessRequest<'a> {
    /// A request on behalf of a single-record consumer.
    pub fn record(data: &'a Payload, entity_key: &'a str, source_ref_id: &'a str) -> Self {
        Self {
            data,
            entity_key,
            source_ref_id,
            is_collection: false,
        }
    }

    /// A request on behalf of a collection consumer.
    pub fn collection(data: &'a Payload, entity_key: &'a str, source_ref_id: &'a str) -> Self {
        Self {
            data,
            entity_key,
            source_ref_id,
            is_collection: true,
        }
    }

    /// The tag every entity produced by this request is kept alive by.
    #[must_use]
    pub fn ref_source(&self) -> RefSource {
        RefSource::for_origin(self.source_ref_id, self.is_collection)
    }
}

/// Normalizes payloads and merges them into a store.
#[derive(Debug, Clone)]
pub struct EntityProcessor {
    registry: Arc<SchemaRegistry>,
}

impl EntityProcessor {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Fixes the root type of every later call. Fails if the type has no
    /// schema.
    pub fn bind(&self, entity_key: &str) -> EngineResult<BoundProcessor> {
        if !self.registry.contains(entity_key) {
            return Err(EngineError::UnknownEntityKey(entity_key.to_string()));
        }
        Ok(BoundProcessor {
            processor: self.clone(),
            entity_key: EntityKey::from(entity_key),
        })
    }

    /// Normalizes `request.data`, tags every produced entity with the
    /// request's reference source and merges everything in one store call.
    ///
    /// Returns the root ids in input order. Entities new to the store are
    /// shaped by their schema's model; existing ones are updated through the
    /// schema merge strategy. A stub never overwrites the fields of a record
    /// that already exists, it only adds the tag.
    pub fn process(&self, store: &mut EntitiesStore, request: ProcessRequest<'_>) -> Vec<EntityId> {
        let root = if request.is_collection {
            Relation::many(request.entity_key)
        } else {
            Relation::one(request.entity_key)
        };
        let normalized = Normalizer::new(&self.registry).normalize(request.data, &root);
        if normalized.map.is_empty() {
            debug!(entity_key = request.entity_key, "Nothing to merge");
            return normalized.ids;
        }

        let tag = request.ref_source();
        let meta = EntityMeta::new(store.now()).with_ref_source(tag);
        let marker = self.registry.config().partial_marker.as_str();

        let mut patches = PatchTable::new();
        let lookup = StoreLookup::new(store);
        for (key, records) in normalized.map {
            let schema = self.registry.get(key.as_str());
            let bucket = patches.entry(key.clone()).or_default();
            for (id, fields) in records {
                let fields = match store.peek(key.as_str(), &id) {
                    Some(_) if is_stub(&fields, marker) => Fields::new(),
                    Some(_) => fields,
                    None => construct(schema, fields, &lookup),
                };
                bucket.insert(id, EntityPatch::new(fields).with_meta(meta.clone()));
            }
        }

        debug!(
            entity_key = request.entity_key,
            source_ref_id = request.source_ref_id,
            roots = normalized.ids.len(),
            "Processed payload"
        );
        self.merge(store, patches);
        normalized.ids
    }

    /// Restores a snapshot produced by [`EntitiesStore::export_snapshot`].
    ///
    /// `None` is a no-op. Types without a schema are skipped. Everything else
    /// is merged in one store call with its metadata restored.
    pub fn hydrate(&self, store: &mut EntitiesStore, snapshot: Option<&StoreSnapshot>) {
        let Some(snapshot) = snapshot else {
            return;
        };

        let mut patches = PatchTable::new();
        let lookup = StoreLookup::new(store);
        for (key, bucket) in snapshot.buckets() {
            let Some(schema) = self.registry.get(key.as_str()) else {
                debug!(entity_key = %key, "Skipping snapshot bucket with no registered schema");
                continue;
            };
            let restored = patches.entry(key.clone()).or_default();
            for (id, entity) in bucket {
                let fields = if store.has_entity(key.as_str(), id) {
                    entity.fields.clone()
                } else {
                    construct(Some(schema), entity.fields.clone(), &lookup)
                };
                let meta = EntityMeta::from(entity.metadata.clone());
                restored.insert(id.clone(), EntityPatch::new(fields).with_meta(meta));
            }
        }

        debug!(buckets = patches.len(), "Hydrating snapshot");
        self.merge(store, patches);
    }

    /// Merges through each type's merge strategy. A full record landing on
    /// a stored stub clears the stub marker.
    fn merge(&self, store: &mut EntitiesStore, patches: PatchTable) {
        let registry = &self.registry;
        let marker = registry.config().partial_marker.as_str();
        store.merge_with(patches, |key, target, source| {
            let clears_stub = !source.is_empty() && !is_stub(&source, marker);
            match registry.get(key.as_str()) {
                Some(schema) => {
                    schema.merge(target, source);
                }
                None => target.extend(source),
            }
            if clears_stub {
                target.remove(marker);
            }
        });
    }
}

/// A processor fixed to one root type.
#[derive(Debug, Clone)]
pub struct BoundProcessor {
    processor: EntityProcessor,
    entity_key: EntityKey,
}

impl BoundProcessor {
    #[must_use]
    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }

    pub fn process(
        &self,
        store: &mut EntitiesStore,
        data: &Payload,
        source_ref_id: &str,
        is_collection: bool,
    ) -> Vec<EntityId> {
        self.processor.process(
            store,
            ProcessRequest {
                data,
                entity_key: self.entity_key.as_str(),
                source_ref_id,
                is_collection,
            },
        )
    }
}

/// Builds a processor bound to `entity_key`, failing fast when the type has
/// no schema.
pub fn create_entity_processor(
    registry: Arc<SchemaRegistry>,
    entity_key: &str,
) -> EngineResult<BoundProcessor> {
    EntityProcessor::new(registry).bind(entity_key)
}

/// Builds a function that hydrates a store from a snapshot.
pub fn create_entity_restorer(
    registry: Arc<SchemaRegistry>,
) -> impl Fn(&mut EntitiesStore, Option<&StoreSnapshot>) {
    let processor = EntityProcessor::new(registry);
    move |store, snapshot| processor.hydrate(store, snapshot)
}

fn construct(schema: Option<&EntitySchema>, dto: Fields, lookup: &dyn EntityLookup) -> Fields {
    match schema.and_then(EntitySchema::get_model) {
        Some(model) => model.construct(dto, lookup),
        None => dto,
    }
}

fn is_stub(fields: &Fields, marker: &str) -> bool {
    matches!(fields.get(marker), Some(Value::Bool(true)))
}
