//! Raw State Nodes
//!
//! A node is one object or array in the state tree. Nodes are shared by
//! reference: placing the same node under two parents does not clone it, and
//! its `NodeId` is the identity used for dependency tracking.
//!
//! Everything in this module is untracked. Reads and writes that should
//! participate in dependency tracking go through [`State`](super::State).

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::value::{Key, Value};
use crate::error::{Result, StoreError};
use crate::reactive::Registry;

/// Largest array index. Larger numeric keys are ordinary named fields.
const MAX_INDEX: usize = u32::MAX as usize - 1;

/// Most slots a single write may add to an array.
const MAX_GROWTH: usize = 1 << 16;

/// Unique identifier for a node in the state tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What shape of node this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A mapping from field names to values.
    Object,

    /// A list keyed by index, with a virtual `length` property. Arrays may
    /// also carry named fields.
    Array,
}

#[derive(Default)]
struct NodeData {
    fields: IndexMap<Arc<str>, Value>,
    items: Vec<Value>,
}

struct NodeInner {
    id: NodeId,
    kind: NodeKind,
    data: RwLock<NodeData>,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        Registry::forget_node(self.id);
    }
}

/// A property change produced by a raw write, in the order it happened.
#[derive(Debug)]
pub(crate) enum Change {
    Write(Key, Value),
    Delete(Key),
}

/// The outcome of a raw write.
///
/// Displaced values are handed back so they are dropped after the node lock
/// is released; dropping a node reaches into the registry.
#[derive(Debug, Default)]
pub(crate) struct Mutation {
    pub changes: SmallVec<[Change; 2]>,
    pub displaced: Vec<Value>,
}

/// A shared handle to a raw object or array.
#[derive(Clone)]
pub struct Node(Arc<NodeInner>);

/// A non-owning handle to a node.
#[derive(Clone)]
pub struct WeakNode(Weak<NodeInner>);

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }
}

impl Node {
    fn new(kind: NodeKind, data: NodeData) -> Self {
        Node(Arc::new(NodeInner {
            id: NodeId::next(),
            kind,
            data: RwLock::new(data),
        }))
    }

    /// Create an object node.
    pub fn object(fields: impl IntoIterator<Item = (Arc<str>, Value)>) -> Self {
        Self::new(
            NodeKind::Object,
            NodeData {
                fields: fields.into_iter().collect(),
                items: Vec::new(),
            },
        )
    }

    /// Create an array node.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::new(
            NodeKind::Array,
            NodeData {
                fields: IndexMap::new(),
                items: items.into_iter().collect(),
            },
        )
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn kind(&self) -> NodeKind {
        self.0.kind
    }

    pub fn is_array(&self) -> bool {
        self.0.kind == NodeKind::Array
    }

    /// Whether both handles point at the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Arc::downgrade(&self.0))
    }

    /// Bring a key into the canonical form for this node's kind.
    pub fn normalize(&self, key: Key) -> Key {
        match (self.0.kind, key) {
            (NodeKind::Object, Key::Index(index)) => Key::Field(Arc::from(index.to_string())),
            (NodeKind::Array, Key::Index(index)) if index > MAX_INDEX => {
                Key::Field(Arc::from(index.to_string()))
            }
            (NodeKind::Array, Key::Field(name)) => match canonical_index(&name) {
                Some(index) => Key::Index(index),
                None => Key::Field(name),
            },
            (_, key) => key,
        }
    }

    /// Read a property without tracking.
    pub fn get_raw(&self, key: &Key) -> Value {
        self.read(&self.normalize(key.clone()))
    }

    /// Number of items for arrays, number of fields for objects.
    pub fn len(&self) -> usize {
        let data = self.0.data.read();
        match self.0.kind {
            NodeKind::Array => data.items.len(),
            NodeKind::Object => data.fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Own keys in order: indices first for arrays, then named fields.
    pub fn keys(&self) -> Vec<Key> {
        let data = self.0.data.read();
        (0..data.items.len())
            .map(Key::Index)
            .chain(data.fields.keys().cloned().map(Key::Field))
            .collect()
    }

    /// Plain JSON rendering of the subtree for inspection. Getters and
    /// actions are omitted and a node already on the current path renders
    /// as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = Vec::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut Vec<NodeId>) -> serde_json::Value {
        if path.contains(&self.id()) {
            return serde_json::Value::Null;
        }
        path.push(self.id());

        let (fields, items) = {
            let data = self.0.data.read();
            (
                data.fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>(),
                data.items.clone(),
            )
        };

        let json = match self.0.kind {
            NodeKind::Array => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| value_to_json(item, path).unwrap_or(serde_json::Value::Null))
                    .collect(),
            ),
            NodeKind::Object => serde_json::Value::Object(
                fields
                    .iter()
                    .filter_map(|(k, v)| value_to_json(v, path).map(|json| (k.to_string(), json)))
                    .collect(),
            ),
        };

        path.pop();
        json
    }

    /// Read a normalized key.
    pub(crate) fn read(&self, key: &Key) -> Value {
        let data = self.0.data.read();
        match key {
            Key::Index(index) => data.items.get(*index).cloned().unwrap_or_default(),
            Key::Field(_) if self.is_array() && key.is_length() => {
                Value::Number(data.items.len() as f64)
            }
            Key::Field(name) => data.fields.get(name).cloned().unwrap_or_default(),
        }
    }

    /// Assign a normalized key, following list semantics on arrays.
    pub(crate) fn assign(&self, key: Key, value: Value) -> Result<Mutation> {
        let mut mutation = Mutation::default();
        let mut data = self.0.data.write();

        match key {
            Key::Index(index) => {
                let len = data.items.len();
                if index < len {
                    if matches!(data.items[index], Value::Getter(_)) {
                        return Err(StoreError::ReadOnly(Key::Index(index)));
                    }
                    let old = mem::replace(&mut data.items[index], value.clone());
                    mutation.displaced.push(old);
                    mutation.changes.push(Change::Write(Key::Index(index), value));
                } else {
                    if index - len >= MAX_GROWTH {
                        return Err(StoreError::InvalidIndex(index));
                    }
                    data.items.resize(index, Value::Undefined);
                    data.items.push(value.clone());
                    for hole in len..index {
                        mutation
                            .changes
                            .push(Change::Write(Key::Index(hole), Value::Undefined));
                    }
                    mutation.changes.push(Change::Write(Key::Index(index), value));
                    mutation.changes.push(Change::Write(
                        Key::from(Key::LENGTH),
                        Value::Number((index + 1) as f64),
                    ));
                }
            }
            key if self.is_array() && key.is_length() => {
                let new_len = array_length(&value)?;
                let len = data.items.len();
                if new_len > len && new_len - len > MAX_GROWTH {
                    return Err(StoreError::InvalidLength(new_len as f64));
                }
                if new_len < len {
                    mutation.displaced.extend(data.items.drain(new_len..));
                    for removed in new_len..len {
                        mutation.changes.push(Change::Delete(Key::Index(removed)));
                    }
                } else {
                    data.items.resize(new_len, Value::Undefined);
                }
                mutation
                    .changes
                    .push(Change::Write(key, Value::Number(new_len as f64)));
            }
            Key::Field(name) => {
                if matches!(data.fields.get(&name), Some(Value::Getter(_))) {
                    return Err(StoreError::ReadOnly(Key::Field(name)));
                }
                if let Some(old) = data.fields.insert(name.clone(), value.clone()) {
                    mutation.displaced.push(old);
                }
                mutation.changes.push(Change::Write(Key::Field(name), value));
            }
        }

        Ok(mutation)
    }

    /// Remove a normalized key. Array indices become `Undefined` holes and
    /// the length is left alone.
    pub(crate) fn remove(&self, key: Key) -> Result<Mutation> {
        let mut mutation = Mutation::default();
        let mut data = self.0.data.write();

        match &key {
            Key::Index(index) => {
                if let Some(slot) = data.items.get_mut(*index) {
                    mutation.displaced.push(mem::take(slot));
                }
            }
            key if self.is_array() && key.is_length() => {
                return Err(StoreError::ReadOnly(key.clone()));
            }
            Key::Field(name) => {
                if let Some(old) = data.fields.shift_remove(name) {
                    mutation.displaced.push(old);
                }
            }
        }

        mutation.changes.push(Change::Delete(key));
        Ok(mutation)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("len", &self.len())
            .finish()
    }
}

fn canonical_index(name: &str) -> Option<usize> {
    let index: usize = name.parse().ok()?;
    (index <= MAX_INDEX && index.to_string() == name).then_some(index)
}

fn array_length(value: &Value) -> Result<usize> {
    match value {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => {
            Ok(*n as usize)
        }
        Value::Number(n) => Err(StoreError::InvalidLength(*n)),
        _ => Err(StoreError::InvalidLength(f64::NAN)),
    }
}

fn value_to_json(value: &Value, path: &mut Vec<NodeId>) -> Option<serde_json::Value> {
    match value {
        Value::Undefined | Value::Getter(_) | Value::Action(_) => None,
        Value::Null => Some(serde_json::Value::Null),
        Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
        Value::Number(n) => Some(
            serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        ),
        Value::String(s) => Some(serde_json::Value::String(s.to_string())),
        Value::Node(node) => Some(node.to_json_inner(path)),
    }
}
