use normcache_types::{EntityId, EntityKey};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::Fields;

/// Fallback id field for schemas whose id comes from a resolver function.
const FALLBACK_ID_KEY: &str = "id";

/// How an entity's id is read from its dto.
#[derive(Clone)]
pub enum IdAttribute {
    /// Read the id from a named field.
    Field(String),
    /// Compute the id from the flattened dto.
    Resolver(Arc<dyn Fn(&Fields) -> Option<EntityId> + Send + Sync>),
}

impl fmt::Debug for IdAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// A nested relation declared on a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// A single nested entity, flattened to `<field>Id`.
    One(EntityKey),
    /// A list of nested entities, flattened to `<field>Id` holding an array.
    Many(EntityKey),
}

impl Relation {
    pub fn one(target: impl Into<EntityKey>) -> Self {
        Self::One(target.into())
    }

    pub fn many(target: impl Into<EntityKey>) -> Self {
        Self::Many(target.into())
    }

    /// Type tag of the related schema.
    #[must_use]
    pub fn target(&self) -> &EntityKey {
        match self {
            Self::One(key) | Self::Many(key) => key,
        }
    }

    #[must_use]
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }
}

/// Read access to entities that are already stored, handed to model
/// constructors.
pub trait EntityLookup {
    fn lookup(&self, key: &EntityKey, id: &EntityId) -> Option<&Fields>;
}

/// Shapes the stored record the first time an entity enters the store.
///
/// Records already present are updated through the schema's merge strategy
/// and are never constructed again.
pub trait EntityModel: Send + Sync {
    fn construct(&self, dto: Fields, lookup: &dyn EntityLookup) -> Fields;
}

impl<F> EntityModel for F
where
    F: Fn(Fields, &dyn EntityLookup) -> Fields + Send + Sync,
{
    fn construct(&self, dto: Fields, lookup: &dyn EntityLookup) -> Fields {
        self(dto, lookup)
    }
}

/// Preprocesses a flattened dto before it is registered.
pub trait ProcessStrategy: Send + Sync {
    fn process(&self, dto: Fields) -> Fields;
}

impl<F> ProcessStrategy for F
where
    F: Fn(Fields) -> Fields + Send + Sync,
{
    fn process(&self, dto: Fields) -> Fields {
        self(dto)
    }
}

/// Folds an incoming record into the stored one, in place.
pub trait MergeStrategy: Send + Sync {
    fn merge(&self, target: &mut Fields, source: Fields);
}

impl<F> MergeStrategy for F
where
    F: Fn(&mut Fields, Fields) + Send + Sync,
{
    fn merge(&self, target: &mut Fields, source: Fields) {
        self(target, source)
    }
}

/// Describes one entity type.
///
/// Relations name their target by type tag, so schemas may reference
/// themselves or each other in cycles; the [`crate::SchemaRegistry`] resolves
/// the tags.
#[derive(Clone)]
pub struct EntitySchema {
    key: EntityKey,
    definition: BTreeMap<String, Relation>,
    id_attribute: Option<IdAttribute>,
    model: Option<Arc<dyn EntityModel>>,
    process_strategy: Option<Arc<dyn ProcessStrategy>>,
    merge_strategy: Option<Arc<dyn MergeStrategy>>,
}

impl EntitySchema {
    pub fn new(key: impl Into<EntityKey>) -> Self {
        Self {
            key: key.into(),
            definition: BTreeMap::new(),
            id_attribute: None,
            model: None,
            process_strategy: None,
            merge_strategy: None,
        }
    }

    /// Declares a single nested entity under `field`.
    #[must_use]
    pub fn one(mut self, field: impl Into<String>, target: impl Into<EntityKey>) -> Self {
        self.definition.insert(field.into(), Relation::one(target));
        self
    }

    /// Declares a list of nested entities under `field`.
    #[must_use]
    pub fn many(mut self, field: impl Into<String>, target: impl Into<EntityKey>) -> Self {
        self.definition.insert(field.into(), Relation::many(target));
        self
    }

    #[must_use]
    pub fn id_attribute(mut self, field: impl Into<String>) -> Self {
        self.id_attribute = Some(IdAttribute::Field(field.into()));
        self
    }

    #[must_use]
    pub fn id_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Fields) -> Option<EntityId> + Send + Sync + 'static,
    {
        self.id_attribute = Some(IdAttribute::Resolver(Arc::new(resolver)));
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl EntityModel + 'static) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    #[must_use]
    pub fn process_strategy(mut self, strategy: impl ProcessStrategy + 'static) -> Self {
        self.process_strategy = Some(Arc::new(strategy));
        self
    }

    #[must_use]
    pub fn merge_strategy(mut self, strategy: impl MergeStrategy + 'static) -> Self {
        self.merge_strategy = Some(Arc::new(strategy));
        self
    }

    #[must_use]
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    #[must_use]
    pub fn definition(&self) -> &BTreeMap<String, Relation> {
        &self.definition
    }

    #[must_use]
    pub fn relation(&self, field: &str) -> Option<&Relation> {
        self.definition.get(field)
    }

    #[must_use]
    pub fn get_model(&self) -> Option<&dyn EntityModel> {
        self.model.as_deref()
    }

    /// Extracts the entity id from a dto. `None` when the id is missing or not
    /// a string/number.
    #[must_use]
    pub fn get_id(&self, dto: &Fields) -> Option<EntityId> {
        match &self.id_attribute {
            Some(IdAttribute::Resolver(resolve)) => resolve(dto),
            Some(IdAttribute::Field(field)) => dto.get(field).and_then(EntityId::from_value),
            None => dto.get(FALLBACK_ID_KEY).and_then(EntityId::from_value),
        }
    }

    /// Name of the id field. Resolver-based schemas report `"id"`, which is
    /// not necessarily where their id comes from.
    #[must_use]
    pub fn get_id_key(&self) -> &str {
        match &self.id_attribute {
            Some(IdAttribute::Field(field)) => field,
            _ => FALLBACK_ID_KEY,
        }
    }

    /// Runs the process strategy; the default hands the dto back unchanged.
    #[must_use]
    pub fn process(&self, dto: Fields) -> Fields {
        match &self.process_strategy {
            Some(strategy) => strategy.process(dto),
            None => dto,
        }
    }

    /// Merges `source` into `target` and returns `target`.
    ///
    /// The default strategy overwrites every field present in `source` and
    /// leaves the rest of `target` untouched.
    pub fn merge<'a>(&self, target: &'a mut Fields, source: Fields) -> &'a mut Fields {
        match &self.merge_strategy {
            Some(strategy) => strategy.merge(target, source),
            None => assign_fields(target, source),
        }
        target
    }

    /// Whether the id comes from a resolver function rather than a field.
    pub(crate) fn has_id_resolver(&self) -> bool {
        matches!(self.id_attribute, Some(IdAttribute::Resolver(_)))
    }

    /// Fills in the id attribute from configuration when none was declared.
    pub(crate) fn with_default_id_attribute(mut self, field: &str) -> Self {
        if self.id_attribute.is_none() {
            self.id_attribute = Some(IdAttribute::Field(field.to_string()));
        }
        self
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("key", &self.key)
            .field("definition", &self.definition)
            .field("id_attribute", &self.id_attribute)
            .field("model", &self.model.is_some())
            .field("process_strategy", &self.process_strategy.is_some())
            .field("merge_strategy", &self.merge_strategy.is_some())
            .finish()
    }
}

/// Last-write-wins field union.
pub(crate) fn assign_fields(target: &mut Fields, source: Fields) {
    for (field, value) in source {
        target.insert(field, value);
    }
}

/// Truthiness of a foreign-key value: null, false, zero and the empty string
/// mean "no reference".
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
