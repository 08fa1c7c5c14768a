//! Wrapped State Nodes
//!
//! A store's snapshot is a tree of [`StateNode`]s. Scalars are stored raw;
//! objects and arrays carry a hidden tag and the canonical path of their
//! position in the tree. The tag is what makes wrapping idempotent and what
//! separates intercepted nodes from plain data: only tagged nodes record
//! reads and dispatch writes.
//!
//! Untagged sub-trees exist on purpose. A write to a key the parent does not
//! own inserts the value raw, exactly like assigning a fresh property on a
//! plain container, and the inserted sub-tree stays plain until a later
//! intercepted write re-wraps it under its path.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;

use super::path::{join_index, join_key, Segment};

/// A node in a wrapped state tree.
#[derive(Debug, Clone, PartialEq)]
pub enum StateNode {
    /// A scalar leaf: null, boolean, number, or string.
    Scalar(Value),
    /// An object node with insertion-ordered entries.
    Object(ObjectNode),
    /// An array node.
    Array(ArrayNode),
}

/// An object node.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    /// Hidden tag set once by the wrapper builder.
    pub(crate) tagged: bool,
    /// Canonical path of this node; empty at the root.
    pub(crate) path: String,
    /// Child nodes, in insertion order.
    pub(crate) entries: IndexMap<String, StateNode>,
}

/// An array node.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode {
    /// Hidden tag set once by the wrapper builder.
    pub(crate) tagged: bool,
    /// Canonical path of this node; empty at the root.
    pub(crate) path: String,
    /// Child nodes.
    pub(crate) items: Vec<StateNode>,
}

impl From<Value> for StateNode {
    /// Convert a raw value tree into an untagged node tree.
    ///
    /// The result is plain data: no paths, no interception. Run it through
    /// [`wrap`] to bind it to a location.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => StateNode::Object(ObjectNode {
                tagged: false,
                path: String::new(),
                entries: map
                    .into_iter()
                    .map(|(key, child)| (key, StateNode::from(child)))
                    .collect(),
            }),
            Value::Array(items) => StateNode::Array(ArrayNode {
                tagged: false,
                path: String::new(),
                items: items.into_iter().map(StateNode::from).collect(),
            }),
            scalar => StateNode::Scalar(scalar),
        }
    }
}

impl StateNode {
    /// Whether this node has been through the wrapper builder.
    ///
    /// Scalars are never tagged; they pass through wrapping untouched.
    pub fn is_tagged(&self) -> bool {
        match self {
            StateNode::Scalar(_) => false,
            StateNode::Object(obj) => obj.tagged,
            StateNode::Array(arr) => arr.tagged,
        }
    }

    /// The canonical path this node is bound to, if it is a tagged container.
    pub fn path(&self) -> Option<&str> {
        match self {
            StateNode::Scalar(_) => None,
            StateNode::Object(obj) if obj.tagged => Some(&obj.path),
            StateNode::Array(arr) if arr.tagged => Some(&arr.path),
            _ => None,
        }
    }

    /// Materialize this sub-tree as a raw value.
    pub fn to_value(&self) -> Value {
        match self {
            StateNode::Scalar(value) => value.clone(),
            StateNode::Object(obj) => Value::Object(
                obj.entries
                    .iter()
                    .map(|(key, child)| (key.clone(), child.to_value()))
                    .collect(),
            ),
            StateNode::Array(arr) => {
                Value::Array(arr.items.iter().map(StateNode::to_value).collect())
            }
        }
    }

    /// Step to a child node.
    pub(crate) fn child(&self, segment: &Segment) -> Option<&StateNode> {
        match (self, segment) {
            (StateNode::Object(obj), Segment::Key(key)) => obj.entries.get(key),
            (StateNode::Array(arr), Segment::Index(index)) => arr.items.get(*index),
            _ => None,
        }
    }

    /// Step to a child node, mutably.
    pub(crate) fn child_mut(&mut self, segment: &Segment) -> Option<&mut StateNode> {
        match (self, segment) {
            (StateNode::Object(obj), Segment::Key(key)) => obj.entries.get_mut(key),
            (StateNode::Array(arr), Segment::Index(index)) => arr.items.get_mut(*index),
            _ => None,
        }
    }
}

/// Walk from `root` along `segments` to the addressed node.
pub(crate) fn resolve<'a>(root: &'a StateNode, segments: &[Segment]) -> Option<&'a StateNode> {
    let mut node = root;
    for segment in segments {
        node = node.child(segment)?;
    }
    Some(node)
}

/// Walk from `root` along `segments` to the addressed node, mutably.
pub(crate) fn resolve_mut<'a>(
    root: &'a mut StateNode,
    segments: &[Segment],
) -> Option<&'a mut StateNode> {
    let mut node = root;
    for segment in segments {
        node = node.child_mut(segment)?;
    }
    Some(node)
}

/// Wrap a node tree rooted at `path`.
///
/// Scalars and already-tagged nodes pass through unchanged. Untagged objects
/// and arrays are recursively wrapped: each child under its extended path,
/// then the node itself tagged and bound to `path`. This runs at store
/// construction for the whole tree and again on every intercepted write for
/// the newly assigned sub-tree, which is how replacement sub-trees stay
/// path-addressed.
pub fn wrap(node: StateNode, path: &str) -> StateNode {
    match node {
        StateNode::Scalar(value) => StateNode::Scalar(value),
        StateNode::Object(obj) if obj.tagged => StateNode::Object(obj),
        StateNode::Object(obj) => {
            let entries = obj
                .entries
                .into_iter()
                .map(|(key, child)| {
                    let child_path = join_key(path, &key);
                    let child = wrap(child, &child_path);
                    (key, child)
                })
                .collect();
            StateNode::Object(ObjectNode {
                tagged: true,
                path: path.to_string(),
                entries,
            })
        }
        StateNode::Array(arr) if arr.tagged => StateNode::Array(arr),
        StateNode::Array(arr) => {
            let items = arr
                .items
                .into_iter()
                .enumerate()
                .map(|(index, child)| wrap(child, &join_index(path, index)))
                .collect();
            StateNode::Array(ArrayNode {
                tagged: true,
                path: path.to_string(),
                items,
            })
        }
    }
}

impl Serialize for StateNode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            StateNode::Scalar(value) => value.serialize(serializer),
            StateNode::Object(obj) => {
                let mut map = serializer.serialize_map(Some(obj.entries.len()))?;
                for (key, child) in &obj.entries {
                    map.serialize_entry(key, child)?;
                }
                map.end()
            }
            StateNode::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.items.len()))?;
                for item in &arr.items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_conversion_produces_untagged_nodes() {
        let node = StateNode::from(json!({"a": {"b": 1}, "c": [true]}));
        assert!(!node.is_tagged());
        assert_eq!(node.path(), None);

        let a = node.child(&Segment::Key("a".into())).unwrap();
        assert!(!a.is_tagged());
    }

    #[test]
    fn wrapping_tags_every_reachable_container() {
        let node = wrap(StateNode::from(json!({"a": {"b": 1}, "c": [{"d": 2}]})), "");

        assert!(node.is_tagged());
        assert_eq!(node.path(), Some(""));

        let a = node.child(&Segment::Key("a".into())).unwrap();
        assert_eq!(a.path(), Some("a"));

        let c = node.child(&Segment::Key("c".into())).unwrap();
        assert_eq!(c.path(), Some("c"));

        let c0 = c.child(&Segment::Index(0)).unwrap();
        assert_eq!(c0.path(), Some("c[0]"));
    }

    #[test]
    fn wrapping_is_idempotent() {
        let wrapped = wrap(StateNode::from(json!({"a": {"b": [1, 2]}})), "");
        let rewrapped = wrap(wrapped.clone(), "");
        assert_eq!(wrapped, rewrapped);

        // A tagged node keeps its original binding even when re-wrapped
        // under a different path.
        let relocated = wrap(wrapped.clone(), "elsewhere");
        assert_eq!(wrapped, relocated);
    }

    #[test]
    fn scalars_pass_through_the_builder() {
        let node = wrap(StateNode::from(json!(42)), "answer");
        assert_eq!(node, StateNode::Scalar(json!(42)));
        assert!(!node.is_tagged());
    }

    #[test]
    fn wrapping_a_subtree_roots_paths_at_the_assignment() {
        let node = wrap(StateNode::from(json!({"d": {"e": 1}})), "a");
        assert_eq!(node.path(), Some("a"));

        let d = node.child(&Segment::Key("d".into())).unwrap();
        assert_eq!(d.path(), Some("a.d"));
    }

    #[test]
    fn to_value_inverts_conversion() {
        let raw = json!({"a": {"b": 1}, "c": [null, "x"]});
        let node = wrap(StateNode::from(raw.clone()), "");
        assert_eq!(node.to_value(), raw);
    }

    #[test]
    fn resolve_walks_mixed_segments() {
        let node = wrap(StateNode::from(json!({"rows": [{"label": "first"}]})), "");
        let segments = [
            Segment::Key("rows".into()),
            Segment::Index(0),
            Segment::Key("label".into()),
        ];
        let label = resolve(&node, &segments).unwrap();
        assert_eq!(label.to_value(), json!("first"));

        assert!(resolve(&node, &[Segment::Key("missing".into())]).is_none());
        assert!(resolve(&node, &[Segment::Index(0)]).is_none());
    }

    #[test]
    fn serialization_preserves_entry_order() {
        let node = wrap(StateNode::from(json!({"z": 1, "a": 2, "m": 3})), "");
        let text = serde_json::to_string(&node).expect("state tree serializes");
        assert_eq!(text, r#"{"z":1,"a":2,"m":3}"#);
    }
}
