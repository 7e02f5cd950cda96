//! Deferred Work Queue
//!
//! The host framework owns the notion of a "tick". Bindings hand deferred
//! work to a `TickQueue`; the host drains it once per tick with
//! [`TickQueue::run_pending`].
//!
//! Tasks deferred while the queue is draining are held for the next tick,
//! so a task can never starve the caller by re-scheduling itself.

use std::collections::VecDeque;
use std::fmt;
use std::mem;

use parking_lot::Mutex;
use tracing::trace;

type Task = Box<dyn FnOnce() + Send>;

/// A queue of work to run on the next tick.
#[derive(Default)]
pub struct TickQueue {
    pending: Mutex<VecDeque<Task>>,
}

impl TickQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` for the next tick.
    pub fn defer<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.lock().push_back(Box::new(task));
    }

    /// Run everything scheduled before this call. Returns how many tasks ran.
    pub fn run_pending(&self) -> usize {
        let tasks = mem::take(&mut *self.pending.lock());
        let count = tasks.len();

        if count > 0 {
            trace!(tasks = count, "running deferred tasks");
        }

        for task in tasks {
            task();
        }

        count
    }

    /// Number of tasks waiting for the next tick.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TickQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickQueue")
            .field("pending", &self.len())
            .finish()
    }
}
