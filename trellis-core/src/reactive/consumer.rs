//! Consumers and Read Wrappers
//!
//! A [`Consumer`] is one subscription's tracking session. Reads made through
//! its [`View`]s are attributed to it; writes to anything it read invoke its
//! callback.
//!
//! # Wrapper identity
//!
//! Each consumer caches one `View` per node it has handed out, so reading the
//! same nested object twice yields the same wrapper (`View::ptr_eq`). When a
//! property of a node changes, the consumer's wrapper for that node is
//! evicted and the next read mints a fresh one. Frameworks that compare
//! wrappers by reference therefore see a new value exactly where something
//! changed.
//!
//! The cache only holds views weakly. A node replaced in the tree is freed
//! once the caller drops its last view of it.
//!
//! # Teardown
//!
//! [`Consumer::destroy`] (also run on drop) revokes every view it handed
//! out and removes the consumer from the registry. Further access through a
//! stale view fails with [`StoreError::Revoked`].

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, error};

use super::cursor::ActiveConsumer;
use super::registry::Registry;
use super::subscriber::{ConsumerId, Subscriber};
use crate::error::{Result, StoreError};
use crate::state::{Key, Node, Prop, State, Value, Wrapper};
use crate::store::Store;

/// A tracking session over a store.
pub struct Consumer {
    subscriber: Arc<Subscriber>,
    root: Node,
}

impl Consumer {
    /// Create a consumer whose callback fires whenever something it read
    /// changes.
    pub fn new<F>(store: &Store, on_invalidate: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(on_invalidate);
        Registry::register(Arc::clone(&subscriber));

        debug!(consumer = %subscriber.id(), "consumer created");

        Self {
            subscriber,
            root: store.root().clone(),
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.subscriber.id()
    }

    /// The read wrapper over the store's root.
    ///
    /// While held, stable until a root-level property this consumer read
    /// changes.
    pub fn view(&self) -> Result<View> {
        if self.subscriber.is_revoked() {
            return Err(StoreError::Revoked(self.id()));
        }
        Ok(self.subscriber.view_for(self.root.clone()))
    }

    /// Revoke all views and unregister from the registry.
    ///
    /// Calling this more than once is a no-op.
    pub fn destroy(&self) -> Result<()> {
        if !self.subscriber.revoke() {
            return Ok(());
        }

        self.subscriber.clear_views();
        Registry::unregister(self.id())?;

        debug!(consumer = %self.id(), "consumer destroyed");
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.subscriber.is_revoked()
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            error!(consumer = %self.id(), %err, "consumer teardown failed");
        }
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.id())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

struct ViewInner {
    node: Node,
    owner: Weak<Subscriber>,
    consumer: ConsumerId,
}

/// A consumer's read wrapper over one node.
#[derive(Clone)]
pub struct View {
    inner: Arc<ViewInner>,
}

/// A cache slot for a view. Does not keep the node alive.
pub(crate) struct WeakView(Weak<ViewInner>);

impl WeakView {
    pub(crate) fn upgrade(&self) -> Option<View> {
        self.0.upgrade().map(|inner| View { inner })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl View {
    pub(crate) fn downgrade(&self) -> WeakView {
        WeakView(Arc::downgrade(&self.inner))
    }

    pub(crate) fn new(node: Node, owner: Weak<Subscriber>, consumer: ConsumerId) -> Self {
        Self {
            inner: Arc::new(ViewInner {
                node,
                owner,
                consumer,
            }),
        }
    }

    /// The consumer this view belongs to.
    pub fn consumer(&self) -> ConsumerId {
        self.inner.consumer
    }

    /// Whether both views are the same wrapper instance.
    pub fn ptr_eq(&self, other: &View) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn owner(&self) -> Result<Arc<Subscriber>> {
        self.inner
            .owner
            .upgrade()
            .filter(|owner| !owner.is_revoked())
            .ok_or(StoreError::Revoked(self.inner.consumer))
    }

    fn state(&self) -> State {
        State::wrap(self.inner.node.clone())
    }

    /// Read a property, recording it (and anything a computed accessor reads
    /// while resolving it) against this view's consumer.
    pub fn get(&self, key: impl Into<Key>) -> Result<Prop<View>> {
        let owner = self.owner()?;

        let prop = {
            let _active = ActiveConsumer::enter(owner.id());
            self.state().get(key)
        };

        Ok(prop.map_node(|state| owner.view_for(state.raw().clone())))
    }

    /// Assign through to the shared state.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.owner()?;
        self.state().set(key, value)
    }

    /// Delete through to the shared state.
    pub fn delete(&self, key: impl Into<Key>) -> Result<()> {
        self.owner()?;
        self.state().delete(key)
    }

    /// Invoke an action. The action runs against the shared state wrapper.
    pub fn call(&self, key: impl Into<Key>, args: &[Value]) -> Result<Value> {
        self.owner()?;
        self.state().call(key, args)
    }

    /// See [`State::len`]. Array lengths are recorded against this consumer.
    pub fn len(&self) -> Result<usize> {
        let owner = self.owner()?;
        let _active = ActiveConsumer::enter(owner.id());
        Ok(self.state().len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Own keys of the node. Not tracked.
    pub fn keys(&self) -> Result<Vec<Key>> {
        self.owner()?;
        Ok(self.inner.node.keys())
    }

    pub fn is_array(&self) -> bool {
        self.inner.node.is_array()
    }

    /// Untracked JSON rendering of the subtree.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        self.owner()?;
        Ok(self.inner.node.to_json())
    }
}

impl Wrapper for View {
    fn raw(&self) -> &Node {
        &self.inner.node
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("consumer", &self.inner.consumer)
            .field("node", &self.inner.node)
            .finish()
    }
}
