mod common;

use common::{abc_registry, calls, count_callbacks, fields, id, ids, init_tracing, seed, tags};
use normcache_engine::{
    EngineError, EntityProcessor, ProcessRequest, create_entity_processor, create_entity_restorer,
};
use normcache_model::{CacheConfig, EntityLookup, EntitySchema, Fields, Payload, SchemaRegistry};
use normcache_store::{
    BucketSnapshot, EntitiesStore, EntitySnapshot, ManualClock, MetaSnapshot, StoreSnapshot,
};
use normcache_types::{EntityKey, RefSource, Timestamp};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;

fn blog_registry() -> Arc<SchemaRegistry> {
    Arc::new(
        SchemaRegistry::new([
            EntitySchema::new("post").one("author", "user").many("comments", "comment"),
            EntitySchema::new("comment").one("author", "user"),
            EntitySchema::new("user"),
        ])
        .unwrap(),
    )
}

fn stored(store: &EntitiesStore, key: &str, raw_id: &str) -> Value {
    store
        .peek(key, &id(raw_id))
        .map(|e| Value::Object(e.fields().clone()))
        .unwrap_or(Value::Null)
}

fn snapshot_entity(value: Value, created: u64, tags: &[&str]) -> EntitySnapshot {
    EntitySnapshot {
        fields: fields(value),
        metadata: MetaSnapshot {
            created_at: Timestamp::from_millis(created),
            updated_at: Timestamp::from_millis(created + 10),
            accessed_at: Timestamp::from_millis(created + 20),
            ref_sources: tags.iter().map(|t| RefSource::from(*t)).collect(),
        },
    }
}

// ── Process ──────────────────────────────────────────────────────

#[test]
fn process_normalizes_and_tags_collection() {
    init_tracing();
    let processor = EntityProcessor::new(blog_registry());
    let mut store = EntitiesStore::new();
    let payload = Payload::from(json!([
        {"id": "p1", "title": "Hello", "author": {"id": "u1", "name": "Ann"}},
        {"id": "p2", "title": "World", "author": {"id": "u1", "name": "Ann"}}
    ]));

    let roots = processor.process(&mut store, ProcessRequest::collection(&payload, "post", "feed"));

    assert_eq!(roots, ids(&["p1", "p2"]));
    assert_eq!(stored(&store, "post", "p1"), json!({"id": "p1", "title": "Hello", "authorId": "u1"}));
    assert_eq!(stored(&store, "user", "u1"), json!({"id": "u1", "name": "Ann"}));
    for (key, raw) in [("post", "p1"), ("post", "p2"), ("user", "u1")] {
        assert_eq!(tags(&store, key, raw), vec!["collection:feed".to_string()]);
    }
}

#[test]
fn process_single_record_uses_record_tag() {
    let processor = EntityProcessor::new(blog_registry());
    let mut store = EntitiesStore::new();
    let payload = Payload::from(json!({"id": "u1", "name": "Ann"}));

    let roots = processor.process(&mut store, ProcessRequest::record(&payload, "user", "profile"));

    assert_eq!(roots, ids(&["u1"]));
    assert_eq!(tags(&store, "user", "u1"), vec!["record:profile".to_string()]);
}

#[test]
fn tags_accumulate_across_sources() {
    let processor = EntityProcessor::new(blog_registry());
    let mut store = EntitiesStore::new();
    let payload = Payload::from(json!({"id": "u1"}));

    processor.process(&mut store, ProcessRequest::record(&payload, "user", "profile"));
    processor.process(&mut store, ProcessRequest::collection(&payload, "user", "members"));
    processor.process(&mut store, ProcessRequest::record(&payload, "user", "profile"));

    assert_eq!(
        tags(&store, "user", "u1"),
        vec!["collection:members".to_string(), "record:profile".to_string()]
    );
}

#[test]
fn process_merges_into_existing_and_refreshes_metadata() {
    let clock = Arc::new(ManualClock::new(100));
    let mut store = EntitiesStore::with_clock(clock.clone());
    seed(&mut store, "user", json!({"id": "1", "name": "Old", "age": 30}), &["prev"]);

    clock.set(555_555);
    let payload = Payload::from(json!({"id": "1", "name": "New"}));
    EntityProcessor::new(blog_registry())
        .process(&mut store, ProcessRequest::record(&payload, "user", "profile"));

    let entity = store.peek("user", &id("1")).unwrap();
    assert_eq!(Value::Object(entity.fields().clone()), json!({"id": "1", "name": "New", "age": 30}));
    assert_eq!(entity.meta().created_at, Timestamp::from_millis(1));
    assert_eq!(entity.meta().updated_at, Timestamp::from_millis(555_555));
    assert_eq!(entity.meta().accessed_at, Timestamp::from_millis(555_555));
    assert_eq!(tags(&store, "user", "1"), vec!["prev".to_string(), "record:profile".to_string()]);
}

#[test]
fn process_fires_one_callback() {
    let mut store = EntitiesStore::new();
    let counter = count_callbacks(&mut store);
    let payload = Payload::from(json!({
        "id": "p1",
        "author": {"id": "u1"},
        "comments": [{"id": "c1", "author": {"id": "u2"}}, {"id": "c2"}]
    }));

    EntityProcessor::new(blog_registry()).process(&mut store, ProcessRequest::record(&payload, "post", "detail"));

    assert_eq!(store.get_count("comment"), 2);
    assert_eq!(store.get_count("user"), 2);
    assert_eq!(calls(&counter), 1);
}

#[test]
fn empty_payload_skips_merge() {
    let mut store = EntitiesStore::new();
    let counter = count_callbacks(&mut store);
    let payload = Payload::from(json!([]));

    let roots = EntityProcessor::new(blog_registry())
        .process(&mut store, ProcessRequest::collection(&payload, "post", "feed"));

    assert!(roots.is_empty());
    assert_eq!(calls(&counter), 0);
}

#[test]
fn schema_merge_strategy_is_used_for_existing_records() {
    let registry = Arc::new(
        SchemaRegistry::new([EntitySchema::new("doc").merge_strategy(|target: &mut Fields, source: Fields| {
            for (field, value) in source {
                target.entry(field).or_insert(value);
            }
        })])
        .unwrap(),
    );
    let processor = EntityProcessor::new(registry);
    let mut store = EntitiesStore::new();

    let first = Payload::from(json!({"id": "d", "title": "first"}));
    let second = Payload::from(json!({"id": "d", "title": "second", "extra": true}));
    processor.process(&mut store, ProcessRequest::record(&first, "doc", "a"));
    processor.process(&mut store, ProcessRequest::record(&second, "doc", "a"));

    assert_eq!(stored(&store, "doc", "d"), json!({"id": "d", "title": "first", "extra": true}));
}

// ── Partial stubs ────────────────────────────────────────────────

#[test]
fn stubs_are_stored_and_tagged() {
    let mut store = EntitiesStore::new();
    let payload = Payload::from(json!({"id": "p1", "authorId": "u9"}));

    EntityProcessor::new(blog_registry()).process(&mut store, ProcessRequest::record(&payload, "post", "detail"));

    assert_eq!(stored(&store, "user", "u9"), json!({"id": "u9", "__partial": true}));
    assert!(store.peek("user", &id("u9")).unwrap().is_partial("__partial"));
    assert_eq!(tags(&store, "user", "u9"), vec!["record:detail".to_string()]);
}

#[test]
fn stub_does_not_overwrite_stored_record() {
    let processor = EntityProcessor::new(blog_registry());
    let mut store = EntitiesStore::new();
    let user = Payload::from(json!({"id": "u9", "name": "Zed"}));
    processor.process(&mut store, ProcessRequest::record(&user, "user", "profile"));

    let post = Payload::from(json!({"id": "p1", "authorId": "u9"}));
    processor.process(&mut store, ProcessRequest::record(&post, "post", "detail"));

    assert_eq!(stored(&store, "user", "u9"), json!({"id": "u9", "name": "Zed"}));
    assert_eq!(tags(&store, "user", "u9"), vec!["record:detail".to_string(), "record:profile".to_string()]);
}

#[test]
fn full_record_clears_stored_stub_marker() {
    let processor = EntityProcessor::new(blog_registry());
    let mut store = EntitiesStore::new();
    let post = Payload::from(json!({"id": "p1", "authorId": "u9"}));
    processor.process(&mut store, ProcessRequest::record(&post, "post", "detail"));

    assert!(store.peek("user", &id("u9")).unwrap().is_partial("__partial"));

    let user = Payload::from(json!({"id": "u9", "name": "Zed"}));
    processor.process(&mut store, ProcessRequest::record(&user, "user", "profile"));

    assert_eq!(stored(&store, "user", "u9"), json!({"id": "u9", "name": "Zed"}));
}

#[test]
fn stubs_can_be_disabled() {
    let config = CacheConfig {
        materialize_partials: false,
        ..CacheConfig::default()
    };
    let registry = Arc::new(
        SchemaRegistry::build(config, [EntitySchema::new("post").one("author", "user"), EntitySchema::new("user")])
            .unwrap(),
    );
    let mut store = EntitiesStore::new();
    let payload = Payload::from(json!({"id": "p1", "authorId": "u9"}));

    EntityProcessor::new(registry).process(&mut store, ProcessRequest::record(&payload, "post", "detail"));

    assert_eq!(store.get_count("user"), 0);
}

// ── Models ───────────────────────────────────────────────────────

#[test]
fn model_shapes_new_records_only() {
    let registry = Arc::new(
        SchemaRegistry::new([EntitySchema::new("user").model(|mut dto: Fields, _: &dyn EntityLookup| {
            let name = dto.get("name").and_then(Value::as_str).unwrap_or_default().to_uppercase();
            dto.insert("display".into(), Value::String(name));
            dto
        })])
        .unwrap(),
    );
    let processor = EntityProcessor::new(registry);
    let mut store = EntitiesStore::new();

    let first = Payload::from(json!({"id": "1", "name": "ann"}));
    processor.process(&mut store, ProcessRequest::record(&first, "user", "a"));
    assert_eq!(stored(&store, "user", "1"), json!({"id": "1", "name": "ann", "display": "ANN"}));

    let second = Payload::from(json!({"id": "1", "name": "bob"}));
    processor.process(&mut store, ProcessRequest::record(&second, "user", "a"));
    assert_eq!(stored(&store, "user", "1"), json!({"id": "1", "name": "bob", "display": "ANN"}));
}

#[test]
fn model_can_look_up_stored_entities() {
    let registry = Arc::new(
        SchemaRegistry::new([
            EntitySchema::new("team"),
            EntitySchema::new("user").model(|mut dto: Fields, lookup: &dyn EntityLookup| {
                let team = dto
                    .get("teamId")
                    .and_then(normcache_types::EntityId::from_value)
                    .and_then(|team| lookup.lookup(&EntityKey::from("team"), &team))
                    .and_then(|team| team.get("name").cloned())
                    .unwrap_or(Value::Null);
                dto.insert("teamName".into(), team);
                dto
            }),
        ])
        .unwrap(),
    );
    let processor = EntityProcessor::new(registry);
    let mut store = EntitiesStore::new();
    let team = Payload::from(json!({"id": "t", "name": "Core"}));
    processor.process(&mut store, ProcessRequest::record(&team, "team", "x"));

    let user = Payload::from(json!({"id": "u", "teamId": "t"}));
    processor.process(&mut store, ProcessRequest::record(&user, "user", "x"));

    assert_eq!(store.peek("user", &id("u")).unwrap().get("teamName"), Some(&json!("Core")));
}

// ── Hydrate ──────────────────────────────────────────────────────

#[test]
fn hydrate_restores_metadata() {
    let processor = EntityProcessor::new(blog_registry());
    let mut store = EntitiesStore::new();
    let mut snapshot = StoreSnapshot::default();
    snapshot.insert(
        "user",
        BucketSnapshot::from([(id("1"), snapshot_entity(json!({"id": "1", "name": "John"}), 10, &["feed"]))]),
    );

    processor.hydrate(&mut store, Some(&snapshot));

    let entity = store.peek("user", &id("1")).unwrap();
    assert_eq!(entity.get("name"), Some(&json!("John")));
    assert_eq!(entity.meta().created_at, Timestamp::from_millis(10));
    assert_eq!(entity.meta().updated_at, Timestamp::from_millis(20));
    assert_eq!(entity.meta().accessed_at, Timestamp::from_millis(30));
    assert_eq!(tags(&store, "user", "1"), vec!["feed".to_string()]);
}

#[test]
fn hydrate_skips_unknown_types() {
    let processor = EntityProcessor::new(blog_registry());
    let mut store = EntitiesStore::new();
    let counter = count_callbacks(&mut store);
    let snapshot = StoreSnapshot::from_json(
        r#"{"unknown": {"x": {"id": "x", "metadata": {}}}, "post": {"1": {"id": "1", "metadata": {}}}}"#,
    )
    .unwrap();

    processor.hydrate(&mut store, Some(&snapshot));

    assert_eq!(store.get_count("unknown"), 0);
    assert_eq!(store.get_count("post"), 1);
    assert_eq!(calls(&counter), 1);
}

#[test]
fn hydrate_none_does_nothing() {
    let processor = EntityProcessor::new(blog_registry());
    let mut store = EntitiesStore::new();
    let counter = count_callbacks(&mut store);

    processor.hydrate(&mut store, None);

    assert_eq!(calls(&counter), 0);
    assert!(store.get_snapshot().is_empty());
}

#[test]
fn hydrate_applies_model_to_new_entities() {
    let registry = Arc::new(
        SchemaRegistry::new([EntitySchema::new("user").model(|mut dto: Fields, _: &dyn EntityLookup| {
            dto.insert("hydrated".into(), Value::Bool(true));
            dto
        })])
        .unwrap(),
    );
    let mut store = EntitiesStore::new();
    let mut snapshot = StoreSnapshot::default();
    snapshot.insert("user", BucketSnapshot::from([(id("1"), snapshot_entity(json!({"id": "1"}), 1, &[]))]));

    EntityProcessor::new(registry).hydrate(&mut store, Some(&snapshot));

    assert_eq!(stored(&store, "user", "1"), json!({"id": "1", "hydrated": true}));
}

#[test]
fn export_then_hydrate_reproduces_store() {
    let processor = EntityProcessor::new(blog_registry());
    let mut source = EntitiesStore::new();
    let payload = Payload::from(json!({"id": "p1", "author": {"id": "u1"}, "comments": [{"id": "c1"}]}));
    processor.process(&mut source, ProcessRequest::collection(&payload, "post", "feed"));

    let text = source.export_snapshot().to_json().unwrap();
    let mut restored = EntitiesStore::new();
    processor.hydrate(&mut restored, Some(&StoreSnapshot::from_json(&text).unwrap()));

    assert_eq!(restored.get_snapshot(), source.get_snapshot());
    assert_eq!(restored.export_snapshot(), source.export_snapshot());
}

// ── Factories ────────────────────────────────────────────────────

#[test]
fn create_entity_processor_binds_root_type() {
    let bound = create_entity_processor(blog_registry(), "post").unwrap();
    let mut store = EntitiesStore::new();
    let payload = Payload::from(json!([{"id": "p1"}]));

    let roots = bound.process(&mut store, &payload, "feed", true);

    assert_eq!(bound.entity_key().as_str(), "post");
    assert_eq!(roots, ids(&["p1"]));
    assert_eq!(tags(&store, "post", "p1"), vec!["collection:feed".to_string()]);
}

#[test]
fn create_entity_processor_rejects_unknown_type() {
    let err = create_entity_processor(blog_registry(), "nope").unwrap_err();
    assert!(matches!(err, EngineError::UnknownEntityKey(key) if key == "nope"));
    assert!(EntityProcessor::new(abc_registry()).bind("post").is_err());
}

#[test]
fn create_entity_restorer_hydrates() {
    let restore = create_entity_restorer(blog_registry());
    let mut store = EntitiesStore::new();
    let mut snapshot = StoreSnapshot::default();
    snapshot.insert("user", BucketSnapshot::from([(id("1"), snapshot_entity(json!({"id": "1"}), 5, &["x"]))]));

    restore(&mut store, Some(&snapshot));
    restore(&mut store, None);

    assert_eq!(store.get_count("user"), 1);
}
