//! Shared fixtures for engine tests.

#![allow(dead_code)]

use normcache_model::{EntitySchema, Fields, SchemaRegistry};
use normcache_store::{EntitiesStore, EntityMeta, EntityPatch, PatchTable};
use normcache_types::{EntityId, RefSource, Timestamp};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Routes `tracing` output to the test writer, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// `A -> B -> C` plus `A -> [C]`.
pub fn abc_registry() -> Arc<SchemaRegistry> {
    Arc::new(
        SchemaRegistry::new([
            EntitySchema::new("A").one("b", "B").many("cList", "C"),
            EntitySchema::new("B").one("c", "C"),
            EntitySchema::new("C"),
        ])
        .unwrap(),
    )
}

pub fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

pub fn id(raw: &str) -> EntityId {
    EntityId::from(raw)
}

pub fn ids(raw: &[&str]) -> Vec<EntityId> {
    raw.iter().map(|r| EntityId::from(*r)).collect()
}

/// Seeds one entity with the given fields and tags.
pub fn seed(store: &mut EntitiesStore, key: &str, value: Value, tags: &[&str]) {
    let fields = fields(value);
    let entity_id = fields
        .get("id")
        .and_then(EntityId::from_value)
        .expect("fixture needs an id");
    let mut meta = EntityMeta::new(Timestamp::from_millis(1));
    for tag in tags {
        meta = meta.with_ref_source(RefSource::from(*tag));
    }
    let mut table = PatchTable::new();
    table
        .entry(key.into())
        .or_default()
        .insert(entity_id, EntityPatch::new(fields).with_meta(meta));
    store.merge(table);
}

pub fn tags(store: &EntitiesStore, key: &str, raw_id: &str) -> Vec<String> {
    store
        .peek(key, &id(raw_id))
        .map(|e| e.meta().ref_sources.iter().map(ToString::to_string).collect())
        .unwrap_or_default()
}

/// Counts callback invocations on a store.
pub fn count_callbacks(store: &mut EntitiesStore) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = Arc::clone(&calls);
    store.add_on_merge_callback(move || {
        handle.fetch_add(1, Ordering::SeqCst);
    });
    calls
}

pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
