//! Store construction.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::binding::StoreBinding;
use crate::error::{Result, StoreError};
use crate::reactive::{Consumer, View};
use crate::state::{Node, State, Value, WeakNode, Wrapper};

/// A deferred handle to a store's root wrapper.
///
/// Handed to [`Store::build`] so computed accessors and actions nested
/// anywhere in the tree can reach root state. It resolves once construction
/// finishes and holds the root weakly, so closures that capture it do not
/// keep the tree alive.
#[derive(Clone, Default)]
pub struct RootRef {
    root: Arc<OnceLock<WeakNode>>,
}

impl RootRef {
    /// The root wrapper, or `None` during construction or after the store
    /// has been dropped.
    pub fn get(&self) -> Option<State> {
        self.root.get()?.upgrade().map(State::wrap)
    }

    fn resolve(&self, root: &Node) {
        // A RootRef belongs to exactly one build call.
        let _ = self.root.set(root.downgrade());
    }
}

impl fmt::Debug for RootRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootRef")
            .field("resolved", &self.root.get().is_some())
            .finish()
    }
}

/// A reactive state container.
#[derive(Clone)]
pub struct Store {
    state: State,
}

impl Store {
    /// Create a store from an initial object or array.
    pub fn new(initial: impl Into<Value>) -> Result<Self> {
        match initial.into() {
            Value::Node(node) => Ok(Self {
                state: State::wrap(node),
            }),
            _ => Err(StoreError::InvalidRoot),
        }
    }

    /// Create a store from a builder that receives a handle to the eventual
    /// root, for definitions that refer back to root state.
    pub fn build<F>(builder: F) -> Result<Self>
    where
        F: FnOnce(&RootRef) -> Value,
    {
        let root = RootRef::default();
        let store = Self::new(builder(&root))?;
        root.resolve(store.root());
        Ok(store)
    }

    /// The wrapper over the root.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The raw root node.
    pub fn root(&self) -> &Node {
        self.state.raw()
    }

    /// Start a tracking session. See [`Consumer::new`].
    pub fn consumer<F>(&self, on_invalidate: F) -> Consumer
    where
        F: Fn() + Send + Sync + 'static,
    {
        Consumer::new(self, on_invalidate)
    }

    /// A binding whose current value is the consumer's root view.
    pub fn binding(&self) -> StoreBinding<View> {
        StoreBinding::new(self, |view| Ok(view.clone()))
    }

    /// A binding whose current value is a projection of the root view.
    pub fn binding_with<T, F>(&self, selector: F) -> StoreBinding<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&View) -> Result<T> + Send + Sync + 'static,
    {
        StoreBinding::new(self, selector)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("root", self.root()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn store_requires_a_node_root() {
        assert_eq!(Store::new(5).unwrap_err(), StoreError::InvalidRoot);
        assert!(Store::new(json!([1, 2])).is_ok());
    }

    #[test]
    fn builder_can_reach_the_root_from_nested_accessors() {
        let store = Store::build(|root| {
            let root = root.clone();
            Value::object([
                ("count", Value::from(2)),
                (
                    "nested",
                    Value::object([(
                        "doubleCount",
                        Value::getter(move |_| {
                            let count = root
                                .get()
                                .and_then(|root| root.get("count").as_f64())
                                .unwrap_or(0.0);
                            Value::from(count * 2.0)
                        }),
                    )]),
                ),
            ])
        })
        .unwrap();

        let nested = store.state().get("nested").into_node().unwrap();
        assert_eq!(nested.get("doubleCount").as_f64(), Some(4.0));

        store.state().set("count", 10).unwrap();
        assert_eq!(nested.get("doubleCount").as_f64(), Some(20.0));
    }

    #[test]
    fn root_ref_is_unresolved_during_construction() {
        let mut seen = None;
        let store = Store::build(|root| {
            seen = Some(root.get().is_none());
            Value::object([("a", 1)])
        })
        .unwrap();
        assert_eq!(seen, Some(true));
        drop(store);
    }
}
