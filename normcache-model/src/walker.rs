use normcache_types::{EntityId, EntityKey};
use serde_json::Value;

use crate::schema::is_truthy;
use crate::{Fields, SchemaRegistry};

/// Reconstructs the edges the normalizer erased.
///
/// Reads the same `<field><suffix>` foreign keys the normalizer writes, using
/// the same registry configuration, and reports each referenced child.
#[derive(Debug, Clone, Copy)]
pub struct SchemaWalker<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> SchemaWalker<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Calls `visit(child_type, child_id)` once per referenced child, in
    /// relation-field order. Unknown types, missing or falsy foreign keys and
    /// array relations holding a non-array are skipped.
    pub fn walk_fields<F>(&self, key: &str, entity: &Fields, mut visit: F)
    where
        F: FnMut(&EntityKey, EntityId),
    {
        let Some(schema) = self.registry.get(key) else {
            return;
        };
        let config = self.registry.config();

        for (field, relation) in schema.definition() {
            let Some(value) = entity.get(&config.foreign_key_field(field)) else {
                continue;
            };
            if !is_truthy(value) {
                continue;
            }

            let child_key = relation.target();
            if relation.is_many() {
                let Value::Array(ids) = value else {
                    continue;
                };
                for id in ids.iter().filter_map(EntityId::from_value) {
                    visit(child_key, id);
                }
            } else if let Some(id) = EntityId::from_value(value) {
                visit(child_key, id);
            }
        }
    }

    /// Collects the children [`SchemaWalker::walk_fields`] would visit.
    #[must_use]
    pub fn children(&self, key: &str, entity: &Fields) -> Vec<(EntityKey, EntityId)> {
        let mut out = Vec::new();
        self.walk_fields(key, entity, |child_key, id| out.push((child_key.clone(), id)));
        out
    }
}
