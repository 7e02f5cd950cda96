//! Trellis Core
//!
//! This crate provides the core runtime for Trellis, a fine-grained reactive
//! state container for UI components. It implements:
//!
//! - A shared, mutable state tree with intercepted reads, writes and deletes
//! - Per-property dependency tracking for each consumer
//! - Identity-based change detection and targeted re-render notification
//! - A thin binding surface for external-store framework hooks
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `state`: the state tree and the wrapper that intercepts access to it
//! - `reactive`: consumers, the dependency registry and notification fan-out
//! - `binding`: subscribe/snapshot primitives for framework adapters
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use trellis_core::Store;
//!
//! let store = Store::new(json!({"a": {"x": 1}, "b": 1})).unwrap();
//!
//! let renders = Arc::new(AtomicUsize::new(0));
//! let counter = renders.clone();
//! let consumer = store.consumer(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! // Render: read a.x through the consumer's view.
//! let view = consumer.view().unwrap();
//! let a = view.get("a").unwrap().into_node().unwrap();
//! assert_eq!(a.get("x").unwrap().as_f64(), Some(1.0));
//!
//! // Unrelated writes and same-value writes do not re-render.
//! store.state().set("b", 2).unwrap();
//! a.set("x", 1).unwrap();
//! assert_eq!(renders.load(Ordering::SeqCst), 0);
//!
//! // A real change to something we read does.
//! a.set("x", 2).unwrap();
//! assert_eq!(renders.load(Ordering::SeqCst), 1);
//! ```

pub mod binding;
pub mod error;
pub mod reactive;
pub mod state;
mod store;

pub use binding::{Sharing, StoreBinding, Subscription, TickQueue};
pub use error::{Result, StoreError};
pub use reactive::{ActiveConsumer, Consumer, ConsumerId, Registry, View};
pub use state::{unwrap, Key, Node, NodeId, Prop, State, Value, Wrapper};
pub use store::{RootRef, Store};
