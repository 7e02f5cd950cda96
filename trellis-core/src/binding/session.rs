//! Store Binding Sessions
//!
//! # Sharing
//!
//! With [`Sharing::Exclusive`] a binding serves a single subscription and
//! tears its consumer down as soon as that subscription ends.
//!
//! With [`Sharing::RefCounted`] any number of subscriptions share the
//! consumer. When the count drops to zero the teardown is deferred to the
//! next tick and skipped if a subscription came back in the meantime, which
//! is what a framework remount (unsubscribe immediately followed by
//! subscribe) looks like.
//!
//! A snapshot taken with no live subscription (a render ahead of its
//! subscribe) creates the consumer early. A later subscription adopts it.
//! Reference-counted bindings also queue the usual deferred teardown, so a
//! render that never subscribes is cleaned up on the next tick. Exclusive
//! bindings keep that one consumer until they subscribe and unsubscribe, or
//! until the binding is dropped.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, error};

use super::tick::TickQueue;
use crate::error::{Result, StoreError};
use crate::reactive::{Consumer, ConsumerId, View};
use crate::store::Store;

type Selector<T> = dyn Fn(&View) -> Result<T> + Send + Sync;
type Listener = Arc<dyn Fn() + Send + Sync>;

/// How a binding's consumer is shared between subscriptions.
#[derive(Clone, Default)]
pub enum Sharing {
    /// One live subscription; teardown on unsubscribe.
    #[default]
    Exclusive,

    /// Reference counted; teardown deferred to the next tick of the queue.
    RefCounted(Arc<TickQueue>),
}

impl fmt::Debug for Sharing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sharing::Exclusive => f.write_str("Exclusive"),
            Sharing::RefCounted(_) => f.write_str("RefCounted"),
        }
    }
}

struct Session<T> {
    sharing: Sharing,
    consumer: Option<Consumer>,
    listeners: IndexMap<u64, Listener>,
    next_listener: u64,
    snapshot: Option<Arc<T>>,
    version: u64,
    teardown_scheduled: bool,
}

struct BindingInner<T> {
    store: Store,
    selector: Box<Selector<T>>,
    session: Mutex<Session<T>>,
}

/// A store's subscription surface for one rendering context.
pub struct StoreBinding<T> {
    inner: Arc<BindingInner<T>>,
}

impl<T> Clone for StoreBinding<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> StoreBinding<T>
where
    T: Send + Sync + 'static,
{
    /// Create a binding whose current value is `selector` applied to the
    /// consumer's root view.
    pub fn new<F>(store: &Store, selector: F) -> Self
    where
        F: Fn(&View) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(BindingInner {
                store: store.clone(),
                selector: Box::new(selector),
                session: Mutex::new(Session {
                    sharing: Sharing::Exclusive,
                    consumer: None,
                    listeners: IndexMap::new(),
                    next_listener: 0,
                    snapshot: None,
                    version: 0,
                    teardown_scheduled: false,
                }),
            }),
        }
    }

    /// Switch the sharing mode.
    pub fn with_sharing(self, sharing: Sharing) -> Self {
        self.inner.session.lock().sharing = sharing;
        self
    }

    /// Register a callback fired whenever the current value is invalidated.
    ///
    /// The returned [`Subscription`] unsubscribes when dropped.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut session = self.inner.session.lock();

        if matches!(session.sharing, Sharing::Exclusive) && !session.listeners.is_empty() {
            return Err(StoreError::AlreadySubscribed);
        }

        self.inner.ensure_consumer(&mut session);

        let listener = session.next_listener;
        session.next_listener += 1;
        session.listeners.insert(listener, Arc::new(callback));

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription {
            release: Some(Box::new(move || match weak.upgrade() {
                Some(inner) => inner.release(listener),
                None => Ok(()),
            })),
        })
    }

    /// The current value.
    ///
    /// Returns the same `Arc` until something the value was derived from
    /// changes.
    pub fn snapshot(&self) -> Result<Arc<T>> {
        let (view, version) = {
            let mut session = self.inner.session.lock();
            if let Some(snapshot) = &session.snapshot {
                return Ok(Arc::clone(snapshot));
            }
            let view = self.inner.ensure_consumer(&mut session).view()?;
            if session.listeners.is_empty() {
                self.inner.schedule_teardown(&mut session);
            }
            (view, session.version)
        };

        let value = Arc::new((self.inner.selector)(&view)?);

        let mut session = self.inner.session.lock();
        if session.version == version {
            session.snapshot = Some(Arc::clone(&value));
        }
        Ok(value)
    }

    /// Number of invalidations seen so far.
    pub fn version(&self) -> u64 {
        self.inner.session.lock().version
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.session.lock().listeners.len()
    }

    /// The consumer currently backing this binding, if any.
    pub fn consumer_id(&self) -> Option<ConsumerId> {
        self.inner
            .session
            .lock()
            .consumer
            .as_ref()
            .map(Consumer::id)
    }
}

impl<T> BindingInner<T>
where
    T: Send + Sync + 'static,
{
    fn ensure_consumer<'a>(self: &Arc<Self>, session: &'a mut Session<T>) -> &'a Consumer {
        session.consumer.get_or_insert_with(|| {
            let weak: Weak<Self> = Arc::downgrade(self);
            Consumer::new(&self.store, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.invalidated();
                }
            })
        })
    }

    /// Consumer callback: drop the cached value and tell every subscriber.
    fn invalidated(&self) {
        let listeners: SmallVec<[Listener; 4]> = {
            let mut session = self.session.lock();
            session.snapshot = None;
            session.version += 1;
            session.listeners.values().cloned().collect()
        };

        for listener in listeners {
            listener();
        }
    }

    fn release(self: &Arc<Self>, listener: u64) -> Result<()> {
        let retired = {
            let mut session = self.session.lock();
            if session.listeners.shift_remove(&listener).is_none() || !session.listeners.is_empty()
            {
                return Ok(());
            }

            match session.sharing.clone() {
                Sharing::Exclusive => {
                    session.snapshot = None;
                    session.consumer.take()
                }
                Sharing::RefCounted(_) => {
                    self.schedule_teardown(&mut session);
                    None
                }
            }
        };

        match retired {
            Some(consumer) => consumer.destroy(),
            None => Ok(()),
        }
    }

    /// Queue a teardown for the next tick unless one is already queued.
    /// Exclusive bindings have no tick to defer to.
    fn schedule_teardown(self: &Arc<Self>, session: &mut Session<T>) {
        let Sharing::RefCounted(ticks) = &session.sharing else {
            return;
        };
        if session.teardown_scheduled {
            return;
        }

        let ticks = Arc::clone(ticks);
        session.teardown_scheduled = true;
        let weak = Arc::downgrade(self);
        ticks.defer(move || {
            if let Some(inner) = weak.upgrade() {
                inner.deferred_teardown();
            }
        });
    }

    fn deferred_teardown(&self) {
        let retired = {
            let mut session = self.session.lock();
            session.teardown_scheduled = false;
            if !session.listeners.is_empty() {
                debug!("teardown skipped, binding was resubscribed");
                return;
            }
            session.snapshot = None;
            session.consumer.take()
        };

        if let Some(consumer) = retired {
            if let Err(err) = consumer.destroy() {
                error!(consumer = %consumer.id(), %err, "deferred teardown failed");
            }
        }
    }
}

impl<T> fmt::Debug for StoreBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.inner.session.lock();
        f.debug_struct("StoreBinding")
            .field("sharing", &session.sharing)
            .field("subscribers", &session.listeners.len())
            .field("version", &session.version)
            .finish()
    }
}

/// A live subscription. Unsubscribes on drop.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() -> Result<()> + Send + Sync>>,
}

impl Subscription {
    /// Unsubscribe now, surfacing any teardown error.
    pub fn unsubscribe(mut self) -> Result<()> {
        match self.release.take() {
            Some(release) => release(),
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            if let Err(err) = release() {
                error!(%err, "unsubscribe failed");
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
