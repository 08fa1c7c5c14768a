//! Canonical path construction.
//!
//! A canonical path identifies one field location inside a store's tree:
//! object keys joined with `.`, array indices rendered as `[index]`, with
//! the root container at the empty string. Two reads of the same logical
//! field always produce identical path strings, no matter which handle
//! performed the read.

/// One step from a node to a child node.
///
/// Handles carry the segment form of their path so they can walk the live
/// tree without re-parsing the canonical string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// An object key.
    Key(String),
    /// An array index.
    Index(usize),
}

/// Append an object key to a base path.
///
/// The empty root is omitted, so `join_key("", "user")` is `"user"` while
/// `join_key("user", "name")` is `"user.name"`.
pub fn join_key(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}.{key}")
    }
}

/// Append an array index to a base path.
///
/// Indices keep their bracket form even at the root: `join_index("", 0)`
/// is `"[0]"`, `join_index("items", 2)` is `"items[2]"`.
pub fn join_index(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}
