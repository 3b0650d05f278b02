use normcache_types::EntityKey;
use std::collections::BTreeMap;

use crate::{CacheConfig, EntitySchema, ModelError, ModelResult};

/// Every schema of an application, keyed by type tag, plus the naming
/// conventions shared by the normalizer and the walker.
///
/// Built once at setup; a registry that builds successfully has no duplicate
/// keys and no relation pointing at an unregistered type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<EntityKey, EntitySchema>,
    config: CacheConfig,
}

impl SchemaRegistry {
    /// Builds a registry with default configuration.
    pub fn new(schemas: impl IntoIterator<Item = EntitySchema>) -> ModelResult<Self> {
        Self::build(CacheConfig::default(), schemas)
    }

    /// Builds and validates a registry.
    pub fn build(
        config: CacheConfig,
        schemas: impl IntoIterator<Item = EntitySchema>,
    ) -> ModelResult<Self> {
        let mut map = BTreeMap::new();
        for schema in schemas {
            let schema = schema.with_default_id_attribute(&config.default_id_attribute);
            let key = schema.key().clone();
            if map.insert(key.clone(), schema).is_some() {
                return Err(ModelError::DuplicateSchema(key.to_string()));
            }
        }

        for schema in map.values() {
            for (field, relation) in schema.definition() {
                if !map.contains_key(relation.target()) {
                    return Err(ModelError::DanglingRelation {
                        entity_key: schema.key().to_string(),
                        field: field.clone(),
                        target: relation.target().to_string(),
                    });
                }
            }
        }

        Ok(Self {
            schemas: map,
            config,
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&EntitySchema> {
        self.schemas.get(key)
    }

    /// Like [`SchemaRegistry::get`], for setup paths where a missing schema is
    /// a configuration defect.
    pub fn require(&self, key: &str) -> ModelResult<&EntitySchema> {
        self.get(key)
            .ok_or_else(|| ModelError::UnknownSchema(key.to_string()))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.schemas.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.schemas.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
