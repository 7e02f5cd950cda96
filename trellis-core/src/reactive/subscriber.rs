//! Consumer identities and their registered callbacks.
//!
//! A `Subscriber` is the registry-side half of a consumer: the callback to
//! fire on invalidation and the cache of read wrappers that invalidation
//! evicts from.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::consumer::{View, WeakView};
use crate::state::{Node, NodeId};

/// Unique identifier for a consumer.
///
/// Each subscription gets a fresh ID when its consumer is created. IDs are
/// never reused, so a stale ID can never alias a live consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Generate a new unique consumer ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// The registered side of a consumer.
pub(crate) struct Subscriber {
    id: ConsumerId,

    /// The re-render callback.
    on_invalidate: Box<dyn Fn() + Send + Sync>,

    /// Read wrappers minted for this consumer, keyed by the node they front.
    views: Mutex<HashMap<NodeId, WeakView>>,

    revoked: AtomicBool,
}

impl Subscriber {
    pub(crate) fn new<F>(on_invalidate: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: ConsumerId::new(),
            on_invalidate: Box::new(on_invalidate),
            views: Mutex::new(HashMap::new()),
            revoked: AtomicBool::new(false),
        })
    }

    pub(crate) fn id(&self) -> ConsumerId {
        self.id
    }

    /// Invoke the re-render callback.
    pub(crate) fn notify(&self) {
        (self.on_invalidate)();
    }

    /// The cached wrapper for `node`, minting one if there is none or the
    /// cached one has been dropped.
    pub(crate) fn view_for(self: &Arc<Self>, node: Node) -> View {
        let mut views = self.views.lock();
        let id = node.id();

        if let Some(view) = views.get(&id).and_then(WeakView::upgrade) {
            return view;
        }

        views.retain(|_, view| view.is_alive());
        let view = View::new(node, Arc::downgrade(self), self.id);
        views.insert(id, view.downgrade());
        view
    }

    /// Evict the wrapper for `node` so the next access mints a fresh one.
    pub(crate) fn invalidate(&self, node: NodeId) {
        self.views.lock().remove(&node);
    }

    /// Mark the consumer destroyed. Returns false if it already was.
    pub(crate) fn revoke(&self) -> bool {
        !self.revoked.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_views(&self) {
        self.views.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn cached_views(&self) -> usize {
        self.views.lock().values().filter(|view| view.is_alive()).count()
    }
}
