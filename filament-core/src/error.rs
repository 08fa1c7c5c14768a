//! Error types for the state core.
//!
//! Construction is the only fatal path: a store refuses to exist around a
//! value that cannot act as a state tree root. Every other anomaly (writes
//! during an active tracking window, lifecycle calls out of order) is
//! recovered locally and logged, because aborting a computation mid-flight
//! is worse than a redundant notification.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by store construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The initial value passed to [`Store::new`](crate::reactive::Store::new)
    /// was not an object or array tree.
    #[error("initial value of a store must be a non-empty object, got {found}")]
    InvalidInitialValue {
        /// Human-readable kind of the rejected value.
        found: &'static str,
    },
}
