//! State Tree
//!
//! This module implements the wrapped value tree and its boundary with the
//! outside world.
//!
//! # Concepts
//!
//! ## Canonical paths
//!
//! Every node in a store's tree is addressed by a canonical path string:
//! object keys joined with `.`, array indices rendered as `[index]`, rooted
//! at the empty string. Paths, not node identity, are the unit of dependency
//! matching: a sub-tree replaced wholesale still answers to the same logical
//! location, so dependencies recorded before the replacement keep matching.
//!
//! ## Wrapping
//!
//! Raw values enter the system as `serde_json::Value` trees. The wrapper
//! builder converts them into [`StateNode`] trees in which every reachable
//! object and array carries a hidden tag and its canonical path. Wrapping is
//! idempotent: tagged nodes pass through the builder unchanged.
//!
//! ## The container
//!
//! The [`Container`] owns a store's root node and a listener registry. It is
//! the coarse-grained half of the system: every dispatch pushes one "something
//! changed" notification through it, while per-path filtering happens in the
//! reactive layer.

mod container;
mod node;
mod path;

pub use container::{Container, ListenerId};
pub use node::{wrap, ArrayNode, ObjectNode, StateNode};
pub use path::{join_index, join_key, Segment};

pub(crate) use node::{resolve, resolve_mut};
