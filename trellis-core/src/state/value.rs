//! Values stored in the state tree.
//!
//! The tree is a uniform tagged value: scalars, shared nodes (objects and
//! arrays), computed accessors and actions. Nodes are the only values with
//! identity; everything else compares by value.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::node::Node;
use super::wrapper::State;
use crate::error::Result;

/// Counter for callable identities.
static CALLABLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_callable_id() -> u64 {
    CALLABLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A property key.
///
/// Keys are normalized by the node they address: objects only ever see
/// `Field`, arrays see `Index` for canonical decimal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(Arc<str>),
    Index(usize),
}

impl Key {
    /// The virtual `length` property of arrays.
    pub const LENGTH: &'static str = "length";

    pub fn is_length(&self) -> bool {
        matches!(self, Key::Field(name) if &**name == Key::LENGTH)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(Arc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(Arc::from(name))
    }
}

impl From<Arc<str>> for Key {
    fn from(name: Arc<str>) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

type GetterFn = dyn Fn(&State) -> Value + Send + Sync;
type ActionFn = dyn Fn(&State, &[Value]) -> Result<Value> + Send + Sync;

/// A no-argument computed accessor.
///
/// The accessor receives the wrapper of the object it lives on, so reads it
/// performs go through the same interception as any other read.
#[derive(Clone)]
pub struct Getter {
    id: u64,
    f: Arc<GetterFn>,
}

impl Getter {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn resolve(&self, this: &State) -> Value {
        (self.f)(this)
    }
}

/// An action method, invoked with the wrapper of the object it lives on.
#[derive(Clone)]
pub struct Action {
    id: u64,
    f: Arc<ActionFn>,
}

impl Action {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn invoke(&self, this: &State, args: &[Value]) -> Result<Value> {
        (self.f)(this, args)
    }
}

/// A value in the state tree.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Node(Node),
    Getter(Getter),
    Action(Action),
}

impl Value {
    /// Build an object node from key/value pairs, keeping insertion order.
    pub fn object<K, V, I>(fields: I) -> Self
    where
        K: Into<Arc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Node(Node::object(
            fields.into_iter().map(|(k, v)| (k.into(), v.into())),
        ))
    }

    /// Build an array node.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Node(Node::array(items.into_iter().map(Into::into)))
    }

    /// A computed accessor.
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn(&State) -> Value + Send + Sync + 'static,
    {
        Value::Getter(Getter {
            id: next_callable_id(),
            f: Arc::new(f),
        })
    }

    /// An action method.
    pub fn action<F>(f: F) -> Self
    where
        F: Fn(&State, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Value::Action(Action {
            id: next_callable_id(),
            f: Arc::new(f),
        })
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Node(node) => fmt::Debug::fmt(node, f),
            Value::Getter(getter) => write!(f, "Getter(#{})", getter.id),
            Value::Action(action) => write!(f, "Action(#{})", action.id),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => Value::array(items),
            serde_json::Value::Object(fields) => Value::object(fields),
        }
    }
}

/// A wrapper over a raw node: either the shared state wrapper or a
/// consumer's read wrapper.
pub trait Wrapper {
    /// The raw node behind this wrapper.
    fn raw(&self) -> &Node;
}

/// A property as seen through a wrapper. Nested nodes come back wrapped,
/// computed accessors come back resolved.
#[derive(Debug, Clone)]
pub enum Prop<W> {
    Value(Value),
    Node(W),
}

impl<W> Prop<W> {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Prop::Value(value) => Some(value),
            Prop::Node(_) => None,
        }
    }

    pub fn node(&self) -> Option<&W> {
        match self {
            Prop::Node(node) => Some(node),
            Prop::Value(_) => None,
        }
    }

    pub fn into_node(self) -> Option<W> {
        match self {
            Prop::Node(node) => Some(node),
            Prop::Value(_) => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.value().is_some_and(Value::is_undefined)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.value().and_then(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value().and_then(Value::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value().and_then(Value::as_str)
    }

    pub(crate) fn map_node<U>(self, f: impl FnOnce(W) -> U) -> Prop<U> {
        match self {
            Prop::Value(value) => Prop::Value(value),
            Prop::Node(node) => Prop::Node(f(node)),
        }
    }
}

impl<W: Wrapper> Prop<W> {
    /// Strip the wrapper, yielding the raw value.
    pub fn into_value(self) -> Value {
        unwrap(self)
    }
}

/// Recover the raw value behind a property: wrapped nodes yield their raw
/// node, anything else is returned unchanged.
pub fn unwrap<W: Wrapper>(prop: Prop<W>) -> Value {
    match prop {
        Prop::Value(value) => value,
        Prop::Node(wrapper) => Value::Node(wrapper.raw().clone()),
    }
}
