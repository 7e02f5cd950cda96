//! Active Consumer Cursor
//!
//! The cursor marks which consumer the current read belongs to. It is only
//! set while a consumer's read wrapper resolves a single property, so reads
//! that happen afterwards (framework internals, plain inspection) are never
//! attributed to it.
//!
//! # Implementation
//!
//! The cursor is a thread-local stack. Entering pushes, the returned guard
//! pops on drop, so a computed accessor that reads through a second
//! consumer's wrapper nests correctly and a panic mid-resolution cannot leave
//! a stale consumer active.

use std::cell::RefCell;
use std::marker::PhantomData;

use smallvec::SmallVec;

use super::ConsumerId;

thread_local! {
    static ACTIVE: RefCell<SmallVec<[ConsumerId; 4]>> = RefCell::new(SmallVec::new());
}

/// Guard that keeps a consumer active until dropped.
pub struct ActiveConsumer {
    consumer: ConsumerId,
    // The cursor is per thread; the guard must be dropped where it was made.
    _not_send: PhantomData<*const ()>,
}

impl ActiveConsumer {
    /// Make `consumer` the active consumer until the guard is dropped.
    pub fn enter(consumer: ConsumerId) -> Self {
        ACTIVE.with(|stack| stack.borrow_mut().push(consumer));

        Self {
            consumer,
            _not_send: PhantomData,
        }
    }

    /// The consumer reads are currently attributed to, if any.
    pub fn current() -> Option<ConsumerId> {
        ACTIVE.with(|stack| stack.borrow().last().copied())
    }

    pub fn is_active() -> bool {
        ACTIVE.with(|stack| !stack.borrow().is_empty())
    }
}

impl Drop for ActiveConsumer {
    fn drop(&mut self) {
        ACTIVE.with(|stack| {
            let popped = stack.borrow_mut().pop();

            debug_assert_eq!(
                popped,
                Some(self.consumer),
                "active consumer mismatch: expected {:?}, got {:?}",
                self.consumer,
                popped
            );
        });
    }
}
