//! Snapshot Container
//!
//! The container is the coarse-grained boundary of a store: it owns the
//! wrapped root node and a registry of change listeners. Intercepted writes
//! edit the snapshot in place through a silent hook; the dispatcher then
//! pushes one notification through [`Container::set_snapshot`] with a no-op
//! patch, so listeners hear "something changed" exactly once per mutation.
//!
//! Listeners always fire, even when no observation session matched the
//! written path. Per-path filtering is the reactive layer's job; external
//! subscribers rely on receiving a notification per mutation and re-check
//! their own snapshots by identity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::node::StateNode;

/// Counter for generating unique listener IDs.
static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier handed out by [`Container::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Holds a store's snapshot and fans out change notifications.
pub struct Container {
    /// The wrapped root node.
    snapshot: RwLock<StateNode>,

    /// Registered change listeners, keyed by id.
    listeners: RwLock<Vec<(ListenerId, Arc<dyn Fn() + Send + Sync>)>>,
}

impl Container {
    /// Create a container around an already-wrapped root node.
    pub fn new(root: StateNode) -> Self {
        Self {
            snapshot: RwLock::new(root),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Read the current snapshot.
    pub fn with_snapshot<R>(&self, read: impl FnOnce(&StateNode) -> R) -> R {
        let snapshot = self.snapshot.read().expect("snapshot lock poisoned");
        read(&snapshot)
    }

    /// Edit the snapshot in place without notifying listeners.
    ///
    /// Intercepted writes use this: the mutation lands silently, and the
    /// dispatcher triggers notification separately so it fires once per
    /// mutation rather than once per touched node.
    pub(crate) fn with_snapshot_mut<R>(&self, edit: impl FnOnce(&mut StateNode) -> R) -> R {
        let mut snapshot = self.snapshot.write().expect("snapshot lock poisoned");
        edit(&mut snapshot)
    }

    /// Apply a patch to the snapshot, then notify every listener.
    ///
    /// The patch may be a no-op; listeners fire regardless. The dispatcher
    /// relies on this to force downstream re-checks after every mutation.
    pub fn set_snapshot<R>(&self, patch: impl FnOnce(&mut StateNode) -> R) -> R {
        let out = self.with_snapshot_mut(patch);
        self.notify_listeners();
        out
    }

    /// Register a change listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.listeners
            .write()
            .expect("listener registry lock poisoned")
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners
            .write()
            .expect("listener registry lock poisoned")
            .retain(|(listener_id, _)| *listener_id != id);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .expect("listener registry lock poisoned")
            .len()
    }

    /// Invoke every registered listener.
    ///
    /// Listeners are collected first so none runs while the registry lock
    /// is held; a listener may unsubscribe itself or others.
    fn notify_listeners(&self) {
        let listeners: Vec<Arc<dyn Fn() + Send + Sync>> = self
            .listeners
            .read()
            .expect("listener registry lock poisoned")
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener();
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::wrap;
    use serde_json::json;
    use std::sync::atomic::AtomicI32;

    fn container() -> Container {
        Container::new(wrap(StateNode::from(json!({"x": 1})), ""))
    }

    #[test]
    fn set_snapshot_notifies_listeners() {
        let container = container();
        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = fired.clone();

        container.subscribe(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        container.set_snapshot(|_| {});
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        container.set_snapshot(|_| {});
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn silent_edits_do_not_notify() {
        let container = container();
        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = fired.clone();

        container.subscribe(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        container.with_snapshot_mut(|root| {
            if let StateNode::Object(obj) = root {
                obj.entries.insert("y".to_string(), StateNode::Scalar(json!(2)));
            }
        });

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(
            container.with_snapshot(|root| root.to_value()),
            json!({"x": 1, "y": 2})
        );
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let container = container();
        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = fired.clone();

        let id = container.subscribe(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(container.listener_count(), 1);

        container.set_snapshot(|_| {});
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        container.unsubscribe(id);
        assert_eq!(container.listener_count(), 0);

        container.set_snapshot(|_| {});
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_fire_even_for_noop_patches() {
        let container = container();
        let fired = Arc::new(AtomicI32::new(0));
        let fired_clone = fired.clone();

        container.subscribe(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Nothing in the tree changes, listeners still hear about it.
        let before = container.with_snapshot(|root| root.to_value());
        container.set_snapshot(|_| {});
        let after = container.with_snapshot(|root| root.to_value());

        assert_eq!(before, after);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
