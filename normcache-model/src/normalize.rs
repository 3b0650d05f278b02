//! Payload normalization.
//!
//! Flattens a nested payload into per-type entity tables. Every nested
//! relation is replaced by a `<field>Id` foreign key holding the child id (or
//! an array of ids), and the child is registered in its own bucket.

use normcache_types::{EntityId, EntityKey};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::schema::is_truthy;
use crate::{EntitySchema, Fields, NodeId, Payload, Relation, SchemaRegistry, Slot};

/// Per-type entity tables: type tag → id → record.
pub type EntityTable = BTreeMap<EntityKey, BTreeMap<EntityId, Fields>>;

/// Result of one normalize call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedOutput {
    /// Root ids in input order. Root elements without a usable id have no
    /// entry here; their positions are listed in `skipped`.
    pub ids: Vec<EntityId>,
    /// Positions of root elements that produced no id, in input order. A
    /// single root object counts as position 0.
    pub skipped: Vec<usize>,
    /// Every entity reached from the roots, including partial stubs.
    pub map: EntityTable,
}

/// Working state of a single normalize call, dropped when it returns.
struct Pass<'p> {
    payload: &'p Payload,
    bucket: EntityTable,
    visited: HashMap<NodeId, EntityId>,
}

/// Flattens payloads according to the schemas of a registry.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> Normalizer<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Normalizes a payload whose root is a single object or a list of
    /// objects. `schema` names the root type; `Relation::Many` is accepted as
    /// the "list of this type" form, but the output shape follows the input.
    pub fn normalize(&self, input: &Payload, schema: &Relation) -> NormalizedOutput {
        if input.is_empty() {
            return NormalizedOutput::default();
        }

        let mut pass = Pass {
            payload: input,
            bucket: EntityTable::new(),
            visited: HashMap::new(),
        };
        let roots: Vec<&Slot> = match input.root() {
            Slot::List(items) => items.iter().collect(),
            other => vec![other],
        };
        let mut ids = Vec::with_capacity(roots.len());
        let mut skipped = Vec::new();
        for (position, slot) in roots.into_iter().enumerate() {
            match self.normalize_slot(&mut pass, slot, schema.target()) {
                Some(id) => ids.push(id),
                None => skipped.push(position),
            }
        }

        NormalizedOutput {
            ids,
            skipped,
            map: pass.bucket,
        }
    }

    /// Convenience for JSON tree payloads.
    pub fn normalize_json(&self, input: &Value, schema: &Relation) -> NormalizedOutput {
        if input.is_null() {
            return NormalizedOutput::default();
        }
        self.normalize(&Payload::from(input), schema)
    }

    fn run(&self, pass: &mut Pass<'_>, slot: &Slot, key: &EntityKey) -> Vec<EntityId> {
        match slot {
            Slot::List(items) => items
                .iter()
                .filter_map(|item| self.normalize_slot(pass, item, key))
                .collect(),
            other => self.normalize_slot(pass, other, key).into_iter().collect(),
        }
    }

    fn normalize_slot(&self, pass: &mut Pass<'_>, slot: &Slot, key: &EntityKey) -> Option<EntityId> {
        match slot {
            Slot::Node(node) => self.normalize_entity(pass, *node, key),
            _ => None,
        }
    }

    fn normalize_entity(&self, pass: &mut Pass<'_>, node: NodeId, key: &EntityKey) -> Option<EntityId> {
        if let Some(id) = pass.visited.get(&node) {
            return Some(id.clone());
        }

        let Some(schema) = self.registry.get(key.as_str()) else {
            debug!(entity_key = %key, "No schema registered, skipping nested payload");
            return None;
        };
        let payload = pass.payload;
        let raw = payload.node(node)?;

        let mut cleaned = Fields::new();
        for (field, slot) in raw {
            if schema.relation(field).is_some() && slot.is_nested() {
                continue;
            }
            cleaned.insert(field.clone(), payload.slot_to_json(slot));
        }

        // Resolvers see the whole dto, nested relations included.
        let id = if schema.has_id_resolver() {
            schema.get_id(&payload.node_to_fields(node))
        } else {
            schema.get_id(&cleaned)
        };
        let Some(id) = id else {
            warn!(entity_key = %key, "Payload node has no usable id, skipping");
            return None;
        };
        pass.visited.insert(node, id.clone());

        let config = self.registry.config();
        for (field, relation) in schema.definition() {
            let fk_field = config.foreign_key_field(field);
            match raw.get(field) {
                Some(slot) if slot.is_nested() => {
                    let ids = self.run(pass, slot, relation.target());
                    let fk = if relation.is_many() {
                        Value::Array(ids.iter().map(EntityId::to_value).collect())
                    } else {
                        match ids.first() {
                            Some(child) => child.to_value(),
                            None => continue,
                        }
                    };
                    cleaned.insert(fk_field, fk);
                }
                _ if config.materialize_partials => {
                    if let Some(fk) = cleaned.get(&fk_field) {
                        self.stub_foreign_keys(pass, relation, fk);
                    }
                }
                _ => {}
            }
        }

        let record = schema.process(cleaned);
        pass.bucket
            .entry(key.clone())
            .or_default()
            .insert(id.clone(), record);

        Some(id)
    }

    /// Registers a stub for every id in a foreign key that has no record in
    /// this pass yet. A foreign key whose shape does not match the relation
    /// is ignored.
    fn stub_foreign_keys(&self, pass: &mut Pass<'_>, relation: &Relation, fk: &Value) {
        if !is_truthy(fk) {
            return;
        }
        let ids: Vec<EntityId> = match (relation.is_many(), fk) {
            (true, Value::Array(items)) => items.iter().filter_map(EntityId::from_value).collect(),
            (false, scalar) => EntityId::from_value(scalar).into_iter().collect(),
            (true, _) => return,
        };
        if ids.is_empty() {
            return;
        }

        let target = relation.target();
        let id_key = self
            .registry
            .get(target.as_str())
            .map_or("id", EntitySchema::get_id_key);
        let marker = &self.registry.config().partial_marker;
        let bucket = pass.bucket.entry(target.clone()).or_default();
        for id in ids {
            bucket.entry(id.clone()).or_insert_with(|| {
                let mut stub = Fields::new();
                stub.insert(id_key.to_string(), id.to_value());
                stub.insert(marker.clone(), Value::Bool(true));
                stub
            });
        }
    }
}
