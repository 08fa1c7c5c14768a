//! Filament Core
//!
//! This crate provides the reactive state core for the Filament UI runtime.
//! It implements:
//!
//! - Path-level dependency tracking over nested object/array state
//! - Observation sessions that re-run only when the fields they read change
//! - A snapshot container with coarse-grained change notification
//!
//! Unlike signal-based systems where each reactive value is its own cell,
//! Filament tracks dependencies at the granularity of *canonical paths*
//! (`"user.name"`, `"items[2].done"`) inside a single state tree. A
//! computation that reads `user.name` is invalidated by a later write to
//! `user.name` and by nothing else, even though the whole tree lives in one
//! store.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `state`: the tagged value tree, the wrapper builder that binds every
//!   node to its canonical path, and the snapshot container
//! - `reactive`: the tracking slot, observation sessions, and the store
//!   with its dispatcher
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_core::reactive::{Session, Store};
//! use serde_json::json;
//!
//! let store = Store::new(json!({"user": {"name": "ada", "visits": 1}}))?;
//! let session = Session::new();
//!
//! // Reads inside the tracking window are recorded per path.
//! session.track(|| {
//!     let user = store.root().get("user").unwrap();
//!     let _name = user.get("name").unwrap().value();
//! });
//!
//! // A write to an unread path leaves the session alone...
//! store.root().get("user").unwrap().set("visits", json!(2));
//! assert!(!session.is_dirty());
//!
//! // ...while a write to a read path marks it dirty.
//! store.root().get("user").unwrap().set("name", json!("grace"));
//! assert!(session.is_dirty());
//! ```

pub mod error;
pub mod reactive;
pub mod state;

pub use error::{Result, StoreError};
