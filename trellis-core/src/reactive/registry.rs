//! Dependency Registry and Notification Engine
//!
//! The registry is the process-wide coordinator between state wrappers and
//! consumers. It holds three maps:
//!
//! - dependencies: `(node, key)` to the consumers that read it, together
//!   with the value each of them last observed there;
//! - subscribers: consumer ID to its callback and wrapper cache;
//! - cleanup index: consumer ID to every dependency entry it was added to,
//!   so teardown sweeps exactly those entries.
//!
//! # How It Works
//!
//! 1. A read through a wrapper while a consumer is active lands in
//!    [`Registry::record_read`], which adds the consumer to the entry and
//!    remembers the observed value.
//!
//! 2. A write lands in [`Registry::notify_write`]. Every reader whose last
//!    observed value is not identical to the new one has its wrapper for the
//!    node evicted and its callback invoked.
//!
//! 3. A delete lands in [`Registry::notify_delete`], which notifies every
//!    reader regardless of what it saw.
//!
//! Identity, not structure: strings and numbers compare by value, nodes and
//! callables by identity. A structurally equal replacement object is a
//! change.
//!
//! # Failure
//!
//! Fan-out resolves every affected callback before invoking any of them. A
//! reader without a callback means the maps have desynchronized; the write
//! fails with [`StoreError::MissingCallback`] and nobody is notified. A
//! mutation that touches several keys (a truncation, a write past the end of
//! a list) is checked as a whole before any of its keys fan out.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::cursor::ActiveConsumer;
use super::subscriber::{ConsumerId, Subscriber};
use crate::error::{Result, StoreError};
use crate::state::{Change, Key, NodeId, Value};

/// The identity of a value as far as change detection is concerned.
#[derive(Debug, Clone, PartialEq)]
enum Observed {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Node(NodeId),
    Callable(u64),
}

impl Observed {
    fn of(value: &Value) -> Self {
        match value {
            Value::Undefined => Observed::Undefined,
            Value::Null => Observed::Null,
            Value::Bool(b) => Observed::Bool(*b),
            Value::Number(n) => Observed::Number(*n),
            Value::String(s) => Observed::String(Arc::clone(s)),
            Value::Node(node) => Observed::Node(node.id()),
            Value::Getter(getter) => Observed::Callable(getter.id()),
            Value::Action(action) => Observed::Callable(action.id()),
        }
    }
}

/// One `(node, key)` dependency: its readers and what each last saw.
#[derive(Default)]
struct DependencyEntry {
    readers: Mutex<IndexMap<ConsumerId, Observed>>,
}

type CleanupIndex = HashMap<(NodeId, Key), Arc<DependencyEntry>>;

static DEPENDENCIES: OnceLock<DashMap<NodeId, HashMap<Key, Arc<DependencyEntry>>>> =
    OnceLock::new();
static SUBSCRIBERS: OnceLock<DashMap<ConsumerId, Arc<Subscriber>>> = OnceLock::new();
static CLEANUP: OnceLock<DashMap<ConsumerId, CleanupIndex>> = OnceLock::new();

fn dependencies() -> &'static DashMap<NodeId, HashMap<Key, Arc<DependencyEntry>>> {
    DEPENDENCIES.get_or_init(DashMap::new)
}

fn subscribers() -> &'static DashMap<ConsumerId, Arc<Subscriber>> {
    SUBSCRIBERS.get_or_init(DashMap::new)
}

fn cleanup() -> &'static DashMap<ConsumerId, CleanupIndex> {
    CLEANUP.get_or_init(DashMap::new)
}

fn entry(node: NodeId, key: &Key) -> Option<Arc<DependencyEntry>> {
    dependencies()
        .get(&node)
        .and_then(|keys| keys.get(key).cloned())
}

fn observed(change: &Change) -> (&Key, Option<Observed>) {
    match change {
        Change::Write(key, value) => (key, Some(Observed::of(value))),
        Change::Delete(key) => (key, None),
    }
}

/// The process-wide dependency registry.
pub struct Registry;

impl Registry {
    /// Register a consumer's callback and give it an empty cleanup index.
    pub(crate) fn register(subscriber: Arc<Subscriber>) {
        let id = subscriber.id();
        cleanup().insert(id, CleanupIndex::new());
        subscribers().insert(id, subscriber);
    }

    /// Remove every trace of a consumer: its callback, its cleanup index and
    /// its membership in every dependency entry it was added to.
    pub(crate) fn unregister(consumer: ConsumerId) -> Result<()> {
        let subscriber = subscribers().remove(&consumer);
        let (_, index) = cleanup()
            .remove(&consumer)
            .ok_or(StoreError::MissingCleanupIndex(consumer))?;

        for entry in index.values() {
            entry.readers.lock().shift_remove(&consumer);
        }

        debug!(%consumer, dependencies = index.len(), "consumer unregistered");

        match subscriber {
            Some(_) => Ok(()),
            None => Err(StoreError::MissingCallback(consumer)),
        }
    }

    /// Record that the active consumer read `key` on `node` and saw `value`.
    ///
    /// No-op when no consumer is active, or when the active consumer has
    /// already been torn down.
    pub fn record_read(node: NodeId, key: &Key, value: &Value) {
        let Some(consumer) = ActiveConsumer::current() else {
            return;
        };

        let Some(mut index) = cleanup().get_mut(&consumer) else {
            trace!(%consumer, %node, %key, "read by unregistered consumer ignored");
            return;
        };

        let entry = Arc::clone(
            dependencies()
                .entry(node)
                .or_default()
                .entry(key.clone())
                .or_default(),
        );

        entry.readers.lock().insert(consumer, Observed::of(value));
        index.insert((node, key.clone()), entry);

        trace!(%consumer, %node, %key, "read recorded");
    }

    /// Notify readers of `key` on `node` that it now holds `value`.
    ///
    /// Readers whose last observed value is identical to `value` are skipped.
    pub fn notify_write(node: NodeId, key: &Key, value: &Value) -> Result<()> {
        Self::fan_out(node, key, Some(Observed::of(value)))
    }

    /// Notify every reader of `key` on `node` that it was deleted.
    pub fn notify_delete(node: NodeId, key: &Key) -> Result<()> {
        Self::fan_out(node, key, None)
    }

    /// Publish every change of one mutation in order.
    ///
    /// Callbacks for all affected readers of all changes are resolved before
    /// the first change is delivered, so a desynchronized registry fails the
    /// whole mutation without notifying anyone.
    pub(crate) fn notify_changes(node: NodeId, changes: &[Change]) -> Result<()> {
        for change in changes {
            let (key, next) = observed(change);
            Self::check_callbacks(node, key, next.as_ref())?;
        }

        for change in changes {
            let (key, next) = observed(change);
            Self::fan_out(node, key, next)?;
        }

        Ok(())
    }

    fn check_callbacks(node: NodeId, key: &Key, next: Option<&Observed>) -> Result<()> {
        let Some(entry) = entry(node, key) else {
            return Ok(());
        };

        let readers = entry.readers.lock();
        for (consumer, seen) in readers.iter() {
            if next != Some(seen) && !subscribers().contains_key(consumer) {
                return Err(StoreError::MissingCallback(*consumer));
            }
        }

        Ok(())
    }

    fn fan_out(node: NodeId, key: &Key, next: Option<Observed>) -> Result<()> {
        let Some(entry) = entry(node, key) else {
            return Ok(());
        };

        let affected: SmallVec<[Arc<Subscriber>; 4]> = {
            let mut readers = entry.readers.lock();

            let mut stale: SmallVec<[ConsumerId; 4]> = SmallVec::new();
            for (consumer, seen) in readers.iter() {
                if next.as_ref() != Some(seen) {
                    stale.push(*consumer);
                }
            }

            let affected = stale
                .iter()
                .map(|consumer| {
                    subscribers()
                        .get(consumer)
                        .map(|subscriber| Arc::clone(subscriber.value()))
                        .ok_or(StoreError::MissingCallback(*consumer))
                })
                .collect::<Result<SmallVec<[Arc<Subscriber>; 4]>>>()?;

            let recorded = next.unwrap_or(Observed::Undefined);
            for consumer in &stale {
                if let Some(seen) = readers.get_mut(consumer) {
                    *seen = recorded.clone();
                }
            }

            affected
        };

        if affected.is_empty() {
            return Ok(());
        }

        trace!(%node, %key, consumers = affected.len(), "notifying readers");

        for subscriber in affected {
            subscriber.invalidate(node);
            subscriber.notify();
        }

        Ok(())
    }

    /// Consumers currently registered as readers of `key` on `node`.
    pub fn readers(node: NodeId, key: &Key) -> Vec<ConsumerId> {
        entry(node, key)
            .map(|entry| entry.readers.lock().keys().copied().collect())
            .unwrap_or_default()
    }

    /// Whether a consumer still has a registered callback.
    pub fn is_registered(consumer: ConsumerId) -> bool {
        subscribers().contains_key(&consumer)
    }

    /// Number of distinct `(node, key)` pairs a consumer has read.
    pub fn dependency_count(consumer: ConsumerId) -> Option<usize> {
        cleanup().get(&consumer).map(|index| index.len())
    }

    /// Drop the dependency entries of a node that no longer exists, and
    /// strike them from the cleanup index of every consumer that read them.
    pub(crate) fn forget_node(node: NodeId) {
        let Some((_, keys)) = DEPENDENCIES.get().and_then(|deps| deps.remove(&node)) else {
            return;
        };

        let mut stale: SmallVec<[(ConsumerId, Key); 4]> = SmallVec::new();
        for (key, entry) in &keys {
            stale.extend(
                entry
                    .readers
                    .lock()
                    .keys()
                    .map(|consumer| (*consumer, key.clone())),
            );
        }

        for (consumer, key) in stale {
            if let Some(mut index) = cleanup().get_mut(&consumer) {
                index.remove(&(node, key));
            }
        }

        trace!(%node, keys = keys.len(), "node entries released");
    }
}
