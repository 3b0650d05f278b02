//! Payload object graphs.
//!
//! A payload is an arena of object nodes addressed by [`NodeId`]. JSON trees
//! convert into it directly; [`PayloadBuilder`] additionally lets callers
//! share a node between several parents or close cycles
//! (`a.friend = b; b.friend = a`). Node identity is the arena index, which is
//! what the normalizer's visited set keys on.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::Fields;

/// Index of an object node inside a [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// A field value inside a payload node.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Plain JSON with no object nodes inside (scalars, or arrays/objects
    /// passed through as opaque data by the builder).
    Value(Value),
    /// An object node.
    Node(NodeId),
    /// An ordered list of slots.
    List(Vec<Slot>),
}

impl Slot {
    /// Whether the slot holds a nested object or a list made only of nested
    /// objects (an empty list counts). Lists of scalars are plain values.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        match self {
            Self::Node(_) => true,
            Self::List(items) => items.iter().all(|s| matches!(s, Self::Node(_))),
            Self::Value(_) => false,
        }
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<NodeId> for Slot {
    fn from(node: NodeId) -> Self {
        Self::Node(node)
    }
}

impl From<Vec<NodeId>> for Slot {
    fn from(nodes: Vec<NodeId>) -> Self {
        Self::List(nodes.into_iter().map(Slot::Node).collect())
    }
}

type Node = BTreeMap<String, Slot>;

/// An input payload: a root slot plus the object nodes it reaches.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    nodes: Vec<Node>,
    root: Slot,
}

impl Default for Payload {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: Slot::Value(Value::Null),
        }
    }
}

impl Payload {
    #[must_use]
    pub fn builder() -> PayloadBuilder {
        PayloadBuilder::default()
    }

    #[must_use]
    pub fn root(&self) -> &Slot {
        &self.root
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&BTreeMap<String, Slot>> {
        self.nodes.get(id.0)
    }

    /// True for an absent root (`null`) or an empty root list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.root {
            Slot::Value(Value::Null) => true,
            Slot::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Renders a slot back to JSON. A node met again on its own path renders
    /// as `null`, so cyclic payloads terminate.
    #[must_use]
    pub fn slot_to_json(&self, slot: &Slot) -> Value {
        let mut path = HashSet::new();
        self.render(slot, &mut path)
    }

    /// Renders a whole node back to JSON fields.
    #[must_use]
    pub fn node_to_fields(&self, id: NodeId) -> Fields {
        let mut path = HashSet::new();
        match self.render(&Slot::Node(id), &mut path) {
            Value::Object(fields) => fields,
            _ => Fields::new(),
        }
    }

    fn render(&self, slot: &Slot, path: &mut HashSet<NodeId>) -> Value {
        match slot {
            Slot::Value(value) => value.clone(),
            Slot::List(items) => Value::Array(items.iter().map(|s| self.render(s, path)).collect()),
            Slot::Node(id) => {
                let Some(node) = self.nodes.get(id.0) else {
                    return Value::Null;
                };
                if !path.insert(*id) {
                    return Value::Null;
                }
                let fields = node
                    .iter()
                    .map(|(field, s)| (field.clone(), self.render(s, path)))
                    .collect();
                path.remove(id);
                Value::Object(fields)
            }
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        let mut builder = PayloadBuilder::default();
        let root = builder.ingest(value);
        builder.finish(root)
    }
}

impl From<&Value> for Payload {
    fn from(value: &Value) -> Self {
        Self::from(value.clone())
    }
}

/// Builds payloads node by node, including shared and cyclic ones.
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    nodes: Vec<Node>,
}

impl PayloadBuilder {
    /// Adds an object node. Nested JSON objects inside `fields` become their
    /// own nodes; a non-object value yields an empty node.
    pub fn object(&mut self, fields: Value) -> NodeId {
        let node = match fields {
            Value::Object(map) => map.into_iter().map(|(k, v)| (k, self.ingest(v))).collect(),
            _ => Node::new(),
        };
        self.push(node)
    }

    /// Sets a field on an existing node. Unknown nodes are ignored.
    pub fn set(&mut self, node: NodeId, field: impl Into<String>, slot: impl Into<Slot>) -> &mut Self {
        let slot = slot.into();
        if let Some(fields) = self.nodes.get_mut(node.0) {
            fields.insert(field.into(), slot);
        }
        self
    }

    /// Points `node.field` at another node.
    pub fn link(&mut self, node: NodeId, field: impl Into<String>, target: NodeId) -> &mut Self {
        self.set(node, field, Slot::Node(target))
    }

    /// Points `node.field` at an ordered list of nodes.
    pub fn link_many(&mut self, node: NodeId, field: impl Into<String>, targets: &[NodeId]) -> &mut Self {
        self.set(node, field, Slot::from(targets.to_vec()))
    }

    /// Converts a JSON value into a slot, creating nodes for its objects.
    pub fn ingest(&mut self, value: Value) -> Slot {
        match value {
            Value::Object(_) => Slot::Node(self.object(value)),
            Value::Array(items) => Slot::List(items.into_iter().map(|v| self.ingest(v)).collect()),
            scalar => Slot::Value(scalar),
        }
    }

    #[must_use]
    pub fn finish(self, root: impl Into<Slot>) -> Payload {
        Payload {
            nodes: self.nodes,
            root: root.into(),
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }
}
