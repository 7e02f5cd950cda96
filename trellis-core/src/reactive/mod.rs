//! Dependency Tracking
//!
//! This module implements the tracking and notification engine: which
//! consumer read which property, and who to re-render when that property is
//! written or deleted.
//!
//! # Concepts
//!
//! ## Consumers
//!
//! A [`Consumer`] is one subscription's tracking session. It hands out
//! [`View`]s, read wrappers that mark the consumer active for the duration of
//! each property resolution.
//!
//! ## The Registry
//!
//! The [`Registry`] maps `(node, key)` pairs to the consumers that read them
//! and the value each consumer saw. Writes fan out only to readers whose
//! observed value actually changed identity; deletes fan out to every
//! reader.
//!
//! ## The Active Cursor
//!
//! [`ActiveConsumer`] is a thread-local cursor naming the consumer reads are
//! currently attributed to. Because it is thread-local, consumers on
//! different threads never see each other's reads.
//!
//! # Implementation Notes
//!
//! Dependencies accumulate for the lifetime of a consumer; they are swept
//! only when the consumer is destroyed, through its cleanup index.

mod consumer;
mod cursor;
mod registry;
mod subscriber;

pub use consumer::{Consumer, View};
pub use cursor::ActiveConsumer;
pub use registry::Registry;
pub use subscriber::ConsumerId;
