//! Framework Bindings
//!
//! The glue between a store and a UI framework's external-store hook. A
//! [`StoreBinding`] owns at most one [`Consumer`](crate::Consumer) at a
//! time and exposes the two primitives such hooks expect:
//!
//! - `subscribe(callback) -> unsubscribe`, and
//! - a current-value accessor ([`StoreBinding::snapshot`]) that returns the
//!   same `Arc` until the consumer is actually invalidated.
//!
//! Component lifecycle and render scheduling stay on the framework side.

mod session;
mod tick;

pub use session::{Sharing, StoreBinding, Subscription};
pub use tick::TickQueue;
