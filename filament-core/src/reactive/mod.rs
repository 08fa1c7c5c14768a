//! Reactive Tracking
//!
//! This module implements the tracking half of the system: observation
//! sessions, the per-thread tracking slot, and stores with their path
//! dispatcher.
//!
//! # Concepts
//!
//! ## Observation sessions
//!
//! A [`Session`] represents one run of a reactive computation. While it
//! occupies the tracking slot, every field read through a store handle is
//! recorded as a `(store, canonical path)` dependency, and the session is
//! linked into that store's observer registry. A later write to a recorded
//! path marks the session dirty; writes to unread paths leave it alone.
//!
//! ## The tracking slot
//!
//! Each thread has a single-occupant [`TrackingSlot`]. It is deliberately
//! not a stack: nesting works because activation returns the previous
//! occupant and callers restore it on exit, which [`TrackGuard`] makes
//! structural.
//!
//! ## Stores and dispatch
//!
//! A [`Store`] owns one wrapped state tree and the registry of sessions
//! observing it. On every intercepted write it dispatches the written path:
//! matching sessions go dirty, and the underlying container notifies its
//! listeners unconditionally so coarse-grained subscribers always re-check.

mod context;
mod session;
mod store;

pub use context::{TrackGuard, TrackingSlot};
pub use session::{Epoch, Session, SessionId, SessionPhase, Subscription};
pub use store::{NodeRef, Store, StoreId};
