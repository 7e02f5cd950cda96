//! The State Wrapper
//!
//! `State` is the interception point for every read, write and delete on the
//! shared tree:
//!
//! - a read resolves computed accessors against the wrapper, reports the
//!   read to the registry (recorded only while a consumer is active) and
//!   wraps nested nodes on the way out;
//! - a write performs the assignment first and then notifies;
//! - a delete removes first and then notifies, unconditionally.
//!
//! Wrapping is lazy and free: a `State` is just a handle on the raw node, so
//! two wrappers of the same node are the same wrapper as far as
//! [`State::ptr_eq`] is concerned, and wrapping never clones children.

use std::fmt;

use super::node::{Mutation, Node};
use super::value::{Key, Prop, Value, Wrapper};
use crate::error::{Result, StoreError};
use crate::reactive::Registry;

/// The shared wrapper over a state node.
#[derive(Clone)]
pub struct State {
    node: Node,
}

impl State {
    /// Wrap a raw node.
    pub fn wrap(node: Node) -> Self {
        Self { node }
    }

    /// Read a property.
    ///
    /// If a consumer is active, the read is recorded against it, including
    /// reads performed by a computed accessor while it resolves.
    pub fn get(&self, key: impl Into<Key>) -> Prop<State> {
        let key = self.node.normalize(key.into());
        let value = match self.node.read(&key) {
            Value::Getter(getter) => getter.resolve(self),
            value => value,
        };

        Registry::record_read(self.node.id(), &key, &value);

        match value {
            Value::Node(node) => Prop::Node(State::wrap(node)),
            value => Prop::Value(value),
        }
    }

    /// Assign a property and notify its readers.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = self.node.normalize(key.into());
        let mutation = self.node.assign(key, value.into())?;
        self.publish(mutation)
    }

    /// Replace a property with a value computed from its current one.
    pub fn update<F>(&self, key: impl Into<Key>, f: F) -> Result<()>
    where
        F: FnOnce(Prop<State>) -> Value,
    {
        let key = key.into();
        let next = f(self.get(key.clone()));
        self.set(key, next)
    }

    /// Remove a property and notify every reader of it.
    pub fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = self.node.normalize(key.into());
        let mutation = self.node.remove(key)?;
        self.publish(mutation)
    }

    /// Invoke an action method with this wrapper as its receiver.
    pub fn call(&self, key: impl Into<Key>, args: &[Value]) -> Result<Value> {
        let key = self.node.normalize(key.into());
        match self.get(key.clone()) {
            Prop::Value(Value::Action(action)) => action.invoke(self, args),
            _ => Err(StoreError::NotCallable(key)),
        }
    }

    /// Item count of an array (a tracked read of `length`), or field count of
    /// an object (untracked).
    pub fn len(&self) -> usize {
        if self.node.is_array() {
            self.get(Key::LENGTH).as_f64().unwrap_or(0.0) as usize
        } else {
            self.node.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Own keys of the node. Key enumeration is not tracked.
    pub fn keys(&self) -> Vec<Key> {
        self.node.keys()
    }

    pub fn is_array(&self) -> bool {
        self.node.is_array()
    }

    /// Whether both wrappers front the same node.
    pub fn ptr_eq(&self, other: &State) -> bool {
        self.node.ptr_eq(&other.node)
    }

    /// Untracked JSON rendering of the subtree.
    pub fn to_json(&self) -> serde_json::Value {
        self.node.to_json()
    }

    /// Append to an array. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        let len = self.node.len();
        self.set(len, value)?;
        Ok(len + 1)
    }

    /// Remove and return the last item of an array.
    pub fn pop(&self) -> Result<Value> {
        let len = self.node.len();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let last = self.node.read(&Key::Index(len - 1));
        self.set(Key::LENGTH, len - 1)?;
        Ok(last)
    }

    /// Insert into an array, shifting later items up one index.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let len = self.node.len();
        for i in (index..len).rev() {
            self.set(i + 1, self.node.read(&Key::Index(i)))?;
        }
        self.set(index, value)
    }

    /// Remove an item from an array, shifting later items down one index.
    pub fn remove(&self, index: usize) -> Result<Value> {
        let len = self.node.len();
        if index >= len {
            return Ok(Value::Undefined);
        }
        let removed = self.node.read(&Key::Index(index));
        for i in index..len - 1 {
            self.set(i, self.node.read(&Key::Index(i + 1)))?;
        }
        self.set(Key::LENGTH, len - 1)?;
        Ok(removed)
    }

    /// Fan a raw mutation out to the registry, then drop whatever it displaced.
    fn publish(&self, mutation: Mutation) -> Result<()> {
        let Mutation { changes, displaced } = mutation;
        let published = Registry::notify_changes(self.node.id(), &changes);
        drop(displaced);
        published
    }
}

impl Wrapper for State {
    fn raw(&self) -> &Node {
        &self.node
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("State").field(&self.node).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_of(json: serde_json::Value) -> State {
        match Value::from(json) {
            Value::Node(node) => State::wrap(node),
            other => panic!("expected node, got {:?}", other),
        }
    }

    #[test]
    fn nested_reads_return_the_same_wrapper() {
        let state = state_of(json!({"a": {"x": 1}}));
        let first = state.get("a").into_node().unwrap();
        let second = state.get("a").into_node().unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(first.get("x").as_f64(), Some(1.0));
    }

    #[test]
    fn getters_see_the_wrapper() {
        let state = state_of(json!({"n": 2}));
        state
            .node
            .assign(
                Key::from("double"),
                Value::getter(|this| Value::from(this.get("n").as_f64().unwrap_or(0.0) * 2.0)),
            )
            .unwrap();

        assert_eq!(state.get("double").as_f64(), Some(4.0));
        state.set("n", 5).unwrap();
        assert_eq!(state.get("double").as_f64(), Some(10.0));
    }

    #[test]
    fn actions_mutate_through_the_receiver() {
        let state = state_of(json!({"count": 0}));
        state
            .set(
                "increment",
                Value::action(|this, args| {
                    let by = args.first().and_then(Value::as_f64).unwrap_or(1.0);
                    this.update("count", |count| Value::from(count.as_f64().unwrap_or(0.0) + by))?;
                    Ok(Value::Undefined)
                }),
            )
            .unwrap();

        state.call("increment", &[]).unwrap();
        state.call("increment", &[Value::from(4)]).unwrap();
        assert_eq!(state.get("count").as_f64(), Some(5.0));

        assert_eq!(
            state.call("count", &[]).unwrap_err(),
            StoreError::NotCallable(Key::from("count"))
        );
    }

    #[test]
    fn list_helpers_follow_list_semantics() {
        let list = state_of(json!([1, 2, 3]));

        assert_eq!(list.push(4).unwrap(), 4);
        assert_eq!(list.pop().unwrap().as_f64(), Some(4.0));
        list.insert(0, 0).unwrap();
        assert_eq!(list.to_json(), json!([0, 1, 2, 3]));
        assert_eq!(list.remove(1).unwrap().as_f64(), Some(1.0));
        assert_eq!(list.to_json(), json!([0, 2, 3]));
        assert_eq!(list.len(), 3);
        assert!(list.remove(10).unwrap().is_undefined());
    }

    #[test]
    fn string_index_keys_address_array_items() {
        let list = state_of(json!(["a", "b"]));
        assert_eq!(list.get("1").as_str(), Some("b"));
        list.set("length", 1).unwrap();
        assert!(list.get(1).is_undefined());
    }

    #[test]
    fn huge_index_writes_fail_or_become_fields() {
        let list = state_of(json!([1]));

        list.set(usize::MAX, 1).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(usize::MAX).as_f64(), Some(1.0));

        assert_eq!(
            list.set(1_000_000usize, 1).unwrap_err(),
            StoreError::InvalidIndex(1_000_000)
        );
        assert_eq!(list.to_json(), json!([1]));
    }

    #[test]
    fn unwrap_recovers_the_raw_node() {
        let state = state_of(json!({"a": {"x": 1}}));
        let raw = state.get("a").into_value();
        let wrapped = state.get("a").into_node().unwrap();
        assert!(raw.as_node().unwrap().ptr_eq(wrapped.raw()));
        assert_eq!(state.get("missing").into_value().as_f64(), None);
    }
}
