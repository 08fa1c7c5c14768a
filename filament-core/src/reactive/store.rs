//! Stores and Node Handles
//!
//! A store owns one wrapped state tree and the registry of sessions
//! observing it. State is reached through [`NodeRef`] handles: path-bound
//! capabilities that perform the interception a dynamic language would hide
//! behind property access. Reads through a handle record dependencies when
//! a session is tracking; writes re-wrap the incoming sub-tree under the
//! written path and dispatch it.
//!
//! # Dispatch
//!
//! Every intercepted write funnels into [`Store::dispatch`]: sessions whose
//! dependency set contains the written path are marked dirty, then the
//! container notifies its listeners unconditionally. The visible re-run is
//! fine-grained because of the per-session filter; the underlying
//! notification stays coarse-grained on purpose, so external subscribers
//! hear about every mutation and filter by identity themselves.
//!
//! # Discipline
//!
//! Only writes through handles keep tracking honest. The tree is never
//! handed out by mutable reference, but a host that round-trips a snapshot
//! through [`Store::snapshot`] and writes it back wholesale gets exactly
//! the invalidation it asked for: the paths it rewrote.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::state::{
    join_index, join_key, resolve, resolve_mut, wrap, Container, ListenerId, Segment, StateNode,
};

use super::context::TrackingSlot;
use super::session::{Session, SessionId, SessionInner};

/// Counter for generating unique store IDs.
static STORE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a store.
///
/// Sessions key their dependency maps by store ID, so paths recorded
/// against different stores never collide even when the strings match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        Self(STORE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct StoreInner {
    id: StoreId,

    /// Snapshot holder and coarse-grained notification fan-out.
    container: Container,

    /// Sessions currently observing this store, held weakly and pruned on
    /// dispatch. Sessions hold the strong edge, so a dropped session only
    /// leaves a dead entry here.
    observers: RwLock<Vec<(SessionId, Weak<SessionInner>)>>,
}

/// One logical unit of reactive state.
///
/// Cloning a store shares the underlying tree and observer registry.
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a store around an initial value.
    ///
    /// The value must be an object or array tree; null and scalars are
    /// rejected before any store state exists. The whole tree is wrapped
    /// and path-addressed as part of construction.
    pub fn new(initial: Value) -> Result<Self> {
        match &initial {
            Value::Object(_) | Value::Array(_) => {}
            other => {
                return Err(StoreError::InvalidInitialValue {
                    found: value_kind(other),
                })
            }
        }

        let root = wrap(StateNode::from(initial), "");

        Ok(Self {
            inner: Arc::new(StoreInner {
                id: StoreId::next(),
                container: Container::new(root),
                observers: RwLock::new(Vec::new()),
            }),
        })
    }

    /// Get the store's unique ID.
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    /// Handle to the root container, at the empty path.
    pub fn root(&self) -> NodeRef {
        NodeRef {
            store: self.clone(),
            path: String::new(),
            segments: Vec::new(),
        }
    }

    /// Materialize the whole tree as a raw value. Untracked.
    pub fn snapshot(&self) -> Value {
        self.inner.container.with_snapshot(|root| root.to_value())
    }

    /// The snapshot container backing this store.
    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    /// Register a change listener on the underlying container.
    ///
    /// Listeners fire once per mutation, whether or not any session's
    /// dependencies matched the written path.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.container.subscribe(listener)
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner.container.unsubscribe(id);
    }

    /// Number of live sessions in the observer registry.
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .read()
            .expect("observer registry lock poisoned")
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Link a session into the observer registry, exactly once.
    pub(crate) fn register_observer(&self, session: &Session) {
        let mut observers = self
            .inner
            .observers
            .write()
            .expect("observer registry lock poisoned");

        if observers.iter().any(|(id, _)| *id == session.id()) {
            return;
        }

        observers.push((session.id(), Arc::downgrade(session.inner())));
    }

    /// Unlink a session from the observer registry.
    pub(crate) fn remove_observer(&self, id: SessionId) {
        self.inner
            .observers
            .write()
            .expect("observer registry lock poisoned")
            .retain(|(session_id, _)| *session_id != id);
    }

    /// Notify the world that `path` changed.
    ///
    /// Observing sessions whose dependency set contains `path` are marked
    /// dirty. The container then notifies its listeners unconditionally,
    /// with a no-op patch, even when nothing matched.
    pub(crate) fn dispatch(&self, path: &str) {
        let observers: Vec<Arc<SessionInner>> = {
            let mut registry = self
                .inner
                .observers
                .write()
                .expect("observer registry lock poisoned");

            registry.retain(|(_, weak)| weak.strong_count() > 0);
            registry.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
        };

        for session in observers {
            if session.depends_on_path(self.inner.id, path) {
                session.prepare_update();
            }
        }

        self.inner.container.set_snapshot(|_| {});
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A path-bound handle onto one node of a store's tree.
///
/// Handles address *logical locations*, not node instances: a handle stays
/// valid across wholesale replacement of the sub-tree it points into, and
/// resolves against whatever currently lives at its path.
#[derive(Clone)]
pub struct NodeRef {
    store: Store,
    path: String,
    segments: Vec<Segment>,
}

impl NodeRef {
    /// Canonical path of the node this handle addresses.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The store this handle reads from.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Read an object field, returning a handle to it.
    ///
    /// If the field exists on a tagged node and a session occupies the
    /// tracking slot, the field's path is recorded as a dependency. Fields
    /// absent from the node, and fields of untagged sub-trees, pass through
    /// without tracking.
    pub fn get(&self, key: &str) -> Option<NodeRef> {
        let tagged = self.store.inner.container.with_snapshot(|root| {
            match resolve(root, &self.segments)? {
                StateNode::Object(obj) if obj.entries.contains_key(key) => Some(obj.tagged),
                _ => None,
            }
        })?;

        let child_path = join_key(&self.path, key);
        if tagged {
            if let Some(session) = TrackingSlot::current() {
                session.record(&self.store, child_path.clone());
            }
        }

        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.to_string()));
        Some(NodeRef {
            store: self.store.clone(),
            path: child_path,
            segments,
        })
    }

    /// Read an array element, returning a handle to it.
    ///
    /// Tracking follows the same rules as [`NodeRef::get`], with the
    /// element's bracket path recorded.
    pub fn at(&self, index: usize) -> Option<NodeRef> {
        let tagged = self.store.inner.container.with_snapshot(|root| {
            match resolve(root, &self.segments)? {
                StateNode::Array(arr) if index < arr.items.len() => Some(arr.tagged),
                _ => None,
            }
        })?;

        let element_path = join_index(&self.path, index);
        if tagged {
            if let Some(session) = TrackingSlot::current() {
                session.record(&self.store, element_path.clone());
            }
        }

        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Some(NodeRef {
            store: self.store.clone(),
            path: element_path,
            segments,
        })
    }

    /// Materialize the addressed sub-tree as a raw value. Untracked.
    pub fn value(&self) -> Option<Value> {
        self.store
            .inner
            .container
            .with_snapshot(|root| resolve(root, &self.segments).map(StateNode::to_value))
    }

    /// Element count, if this handle addresses an array. Untracked.
    pub fn len(&self) -> Option<usize> {
        self.store
            .inner
            .container
            .with_snapshot(|root| match resolve(root, &self.segments)? {
                StateNode::Array(arr) => Some(arr.items.len()),
                _ => None,
            })
    }

    /// Whether this handle addresses an empty array.
    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }

    /// Field names in order, if this handle addresses an object. Untracked,
    /// so enumeration behaves like walking a plain container.
    pub fn keys(&self) -> Option<Vec<String>> {
        self.store
            .inner
            .container
            .with_snapshot(|root| match resolve(root, &self.segments)? {
                StateNode::Object(obj) => Some(obj.entries.keys().cloned().collect()),
                _ => None,
            })
    }

    /// Write an object field.
    ///
    /// When the field exists on a tagged node, the incoming value is
    /// wrapped under the field's path, assigned, and the path dispatched;
    /// writing during an active tracking window logs a warning first and
    /// proceeds. Writes to absent fields insert the value raw, with no
    /// dispatch, like assigning a fresh property on a plain container.
    pub fn set(&self, key: &str, value: Value) {
        let child_path = join_key(&self.path, key);

        let intercepted = self.store.inner.container.with_snapshot_mut(|root| {
            let obj = match resolve_mut(root, &self.segments) {
                Some(StateNode::Object(obj)) => obj,
                _ => return false,
            };

            if !(obj.tagged && obj.entries.contains_key(key)) {
                obj.entries.insert(key.to_string(), StateNode::from(value));
                return false;
            }

            if TrackingSlot::is_active() {
                warn!(path = %child_path, "state written while a tracking session is active");
            }

            obj.entries
                .insert(key.to_string(), wrap(StateNode::from(value), &child_path));
            true
        });

        if intercepted {
            self.store.dispatch(&child_path);
        }
    }

    /// Write an array element.
    ///
    /// In-bounds writes on a tagged array are intercepted like field
    /// writes. Writing at or past the end extends the array raw (null
    /// filled past the end), with no dispatch.
    pub fn set_at(&self, index: usize, value: Value) {
        let element_path = join_index(&self.path, index);

        let intercepted = self.store.inner.container.with_snapshot_mut(|root| {
            let arr = match resolve_mut(root, &self.segments) {
                Some(StateNode::Array(arr)) => arr,
                _ => return false,
            };

            if !(arr.tagged && index < arr.items.len()) {
                if index < arr.items.len() {
                    arr.items[index] = StateNode::from(value);
                } else {
                    while arr.items.len() < index {
                        arr.items.push(StateNode::Scalar(Value::Null));
                    }
                    arr.items.push(StateNode::from(value));
                }
                return false;
            }

            if TrackingSlot::is_active() {
                warn!(path = %element_path, "state written while a tracking session is active");
            }

            arr.items[index] = wrap(StateNode::from(value), &element_path);
            true
        });

        if intercepted {
            self.store.dispatch(&element_path);
        }
    }

    /// Append a value to the addressed array.
    ///
    /// Equivalent to writing one past the end: the element lands raw and
    /// undispatched, and becomes intercepted once rewritten in bounds.
    pub fn push(&self, value: Value) {
        if let Some(len) = self.len() {
            self.set_at(len, value);
        }
    }

    /// Delete an object field.
    ///
    /// Symmetric to [`NodeRef::set`]: removal of an existing field on a
    /// tagged node dispatches the field's path, warning first when a
    /// session is tracking. Absent fields and untagged sub-trees pass
    /// through silently.
    pub fn remove(&self, key: &str) {
        let child_path = join_key(&self.path, key);

        let intercepted = self.store.inner.container.with_snapshot_mut(|root| {
            let obj = match resolve_mut(root, &self.segments) {
                Some(StateNode::Object(obj)) => obj,
                _ => return false,
            };

            if !obj.entries.contains_key(key) {
                return false;
            }

            if !obj.tagged {
                obj.entries.shift_remove(key);
                return false;
            }

            if TrackingSlot::is_active() {
                warn!(path = %child_path, "state removed while a tracking session is active");
            }

            obj.entries.shift_remove(key);
            true
        });

        if intercepted {
            self.store.dispatch(&child_path);
        }
    }

    /// Delete an array element.
    ///
    /// The slot is nulled rather than shifted out, so sibling element
    /// paths stay stable. In-bounds deletion on a tagged array dispatches
    /// the element's path.
    pub fn remove_at(&self, index: usize) {
        let element_path = join_index(&self.path, index);

        let intercepted = self.store.inner.container.with_snapshot_mut(|root| {
            let arr = match resolve_mut(root, &self.segments) {
                Some(StateNode::Array(arr)) => arr,
                _ => return false,
            };

            if index >= arr.items.len() {
                return false;
            }

            if !arr.tagged {
                arr.items[index] = StateNode::Scalar(Value::Null);
                return false;
            }

            if TrackingSlot::is_active() {
                warn!(path = %element_path, "state removed while a tracking session is active");
            }

            arr.items[index] = StateNode::Scalar(Value::Null);
            true
        });

        if intercepted {
            self.store.dispatch(&element_path);
        }
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("store", &self.store.id())
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn construction_rejects_non_containers() {
        for (value, kind) in [
            (json!(null), "null"),
            (json!(true), "a boolean"),
            (json!(5), "a number"),
            (json!("state"), "a string"),
        ] {
            assert_eq!(
                Store::new(value).unwrap_err(),
                StoreError::InvalidInitialValue { found: kind }
            );
        }

        assert!(Store::new(json!({})).is_ok());
        assert!(Store::new(json!({"x": 1})).is_ok());
        assert!(Store::new(json!([1, 2])).is_ok());
    }

    #[test]
    fn root_handle_addresses_the_empty_path() {
        let store = Store::new(json!({"a": 1})).unwrap();
        assert_eq!(store.root().path(), "");
        assert_eq!(store.snapshot(), json!({"a": 1}));
    }

    #[test]
    fn reads_outside_tracking_record_nothing() {
        let store = Store::new(json!({"a": {"b": 1}})).unwrap();

        let b = store.root().get("a").unwrap().get("b").unwrap();
        assert_eq!(b.value(), Some(json!(1)));
        assert_eq!(b.path(), "a.b");
        assert_eq!(store.observer_count(), 0);
    }

    #[test]
    fn tracked_reads_record_canonical_paths() {
        let store = Store::new(json!({"a": {"b": 1}, "items": [10, 20]})).unwrap();
        let session = Session::new();

        session.track(|| {
            store.root().get("a").unwrap().get("b");
            store.root().get("items").unwrap().at(1);
        });

        assert!(session.depends_on(&store, "a"));
        assert!(session.depends_on(&store, "a.b"));
        assert!(session.depends_on(&store, "items"));
        assert!(session.depends_on(&store, "items[1]"));
        assert!(!session.depends_on(&store, "items[0]"));
        assert_eq!(store.observer_count(), 1);
    }

    #[test]
    fn absent_reads_pass_through_untracked() {
        let store = Store::new(json!({"a": 1})).unwrap();
        let session = Session::new();

        session.track(|| {
            assert!(store.root().get("missing").is_none());
        });

        assert!(!session.depends_on(&store, "missing"));
        assert_eq!(store.observer_count(), 0);
    }

    #[test]
    fn writes_to_read_paths_dirty_the_session() {
        let store = Store::new(json!({"a": {"b": 1, "c": 2}})).unwrap();
        let session = Session::new();

        session.track(|| {
            store.root().get("a").unwrap().get("b");
        });
        assert_eq!(session.phase(), crate::reactive::SessionPhase::Tracked);

        store.root().get("a").unwrap().set("c", json!(99));
        assert!(!session.is_dirty());

        store.root().get("a").unwrap().set("b", json!(5));
        assert!(session.is_dirty());
    }

    #[test]
    fn absent_writes_insert_raw_without_dispatch() {
        let store = Store::new(json!({"a": 1})).unwrap();
        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = fired.clone();
        store.subscribe(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.root().set("fresh", json!({"x": 1}));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(store.snapshot(), json!({"a": 1, "fresh": {"x": 1}}));

        // The key exists now, so rewriting it is intercepted.
        store.root().set("fresh", json!({"x": 2}));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn intercepted_writes_rewrap_the_new_subtree() {
        let store = Store::new(json!({"a": {"old": true}})).unwrap();
        let session = Session::new();

        store.root().set("a", json!({"d": {"e": 1}}));

        session.track(|| {
            store
                .root()
                .get("a")
                .unwrap()
                .get("d")
                .unwrap()
                .get("e");
        });

        assert!(session.depends_on(&store, "a.d.e"));

        store.root().get("a").unwrap().get("d").unwrap().set("e", json!(2));
        assert!(session.is_dirty());
    }

    #[test]
    fn every_dispatch_notifies_container_listeners() {
        let store = Store::new(json!({"a": 1, "b": 2})).unwrap();
        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = fired.clone();
        store.subscribe(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        // No session observes this store at all; listeners still fire.
        store.root().set("a", json!(10));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        store.root().set("b", json!(20));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn array_element_writes_dispatch_bracket_paths() {
        let store = Store::new(json!({"items": [{"done": false}, {"done": true}]})).unwrap();
        let session = Session::new();

        session.track(|| {
            store.root().get("items").unwrap().at(0).unwrap().get("done");
        });

        store
            .root()
            .get("items")
            .unwrap()
            .at(1)
            .unwrap()
            .set("done", json!(false));
        assert!(!session.is_dirty());

        store
            .root()
            .get("items")
            .unwrap()
            .at(0)
            .unwrap()
            .set("done", json!(true));
        assert!(session.is_dirty());
    }

    #[test]
    fn array_extension_is_plain() {
        let store = Store::new(json!({"items": [1]})).unwrap();
        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = fired.clone();
        store.subscribe(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        let items = store.root().get("items").unwrap();
        items.push(json!(2));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        items.set_at(4, json!(5));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(
            store.snapshot(),
            json!({"items": [1, 2, null, null, 5]})
        );

        // In-bounds rewrite of the appended element is intercepted.
        items.set_at(1, json!(20));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removal_dispatches_like_a_write() {
        let store = Store::new(json!({"a": {"b": 1}})).unwrap();
        let session = Session::new();

        session.track(|| {
            store.root().get("a").unwrap().get("b");
        });

        store.root().get("a").unwrap().remove("b");
        assert!(session.is_dirty());
        assert_eq!(store.snapshot(), json!({"a": {}}));
    }

    #[test]
    fn removing_absent_fields_is_silent() {
        let store = Store::new(json!({"a": 1})).unwrap();
        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = fired.clone();
        store.subscribe(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.root().remove("missing");
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handles_resolve_against_the_live_tree() {
        let store = Store::new(json!({"a": {"b": 1}})).unwrap();
        let b = store.root().get("a").unwrap().get("b").unwrap();

        // Replacing the whole sub-tree does not invalidate the handle; it
        // addresses the logical location, not the old node.
        store.root().set("a", json!({"b": 42}));
        assert_eq!(b.value(), Some(json!(42)));
    }

    #[test]
    fn enumeration_is_untracked() {
        let store = Store::new(json!({"a": 1, "b": 2})).unwrap();
        let session = Session::new();

        let keys = session.track(|| store.root().keys().unwrap());
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.observer_count(), 0);
    }
}
