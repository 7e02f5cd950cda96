//! State Tree and Interception
//!
//! This module holds the shared, mutable state tree and the wrapper that
//! intercepts every access to it.
//!
//! # Concepts
//!
//! ## Nodes
//!
//! The tree is made of [`Node`]s: objects (ordered field maps) and arrays
//! (index-keyed lists with a virtual `length`). A node's identity is stable
//! for its lifetime and is what dependency tracking keys on. Leaves are
//! scalars, computed accessors ([`Value::getter`]) and actions
//! ([`Value::action`]).
//!
//! ## Wrappers
//!
//! [`State`] wraps a node and routes reads to the registry and writes and
//! deletes to the notification engine. Nested nodes are wrapped on access,
//! never eagerly.
//!
//! ## Receivers
//!
//! Accessors and actions receive the wrapper of the object they are defined
//! on, not the root. Definitions that need sibling or root state must close
//! over an explicit handle to it: build the store with [`Store::build`] and
//! capture the [`RootRef`] it passes in.
//!
//! [`Store::build`]: crate::Store::build
//! [`RootRef`]: crate::RootRef

mod node;
mod value;
mod wrapper;

pub(crate) use node::Change;
pub use node::{Node, NodeId, NodeKind, WeakNode};
pub use value::{unwrap, Action, Getter, Key, Prop, Value, Wrapper};
pub use wrapper::State;
