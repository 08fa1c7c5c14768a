//! Observation Sessions
//!
//! A session represents one run of a reactive computation. It owns the set
//! of `(store, canonical path)` dependencies recorded during its most recent
//! tracking window, and an epoch marker that external subscribers compare by
//! identity to detect invalidation.
//!
//! # Lifecycle
//!
//! Idle → Tracking → Tracked → Dirty → Tracking → … → Retired.
//!
//! `start_track` forces Tracking from Idle, Tracked, or Dirty: the session
//! first unlinks itself from every store it registered with, then starts a
//! fresh dependency map, so dependencies never accumulate across runs and a
//! store read in run 1 but not run 2 stops invalidating the session.
//! `retire` is the terminal transition: the session unlinks everywhere and
//! accepts no further tracking.
//!
//! # Dirtiness
//!
//! Being marked dirty replaces the session's [`Epoch`] with a new, distinct
//! instance rather than mutating it. A host holding the previous `Arc` can
//! detect the change with a pointer comparison, without inspecting the
//! dependency map.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::warn;

use super::context::TrackGuard;
use super::store::{Store, StoreId};

/// Unique identifier for an observation session.
///
/// Used by store observer registries to deduplicate and unlink sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Constructed, never tracked.
    Idle,

    /// Occupying the tracking slot, accumulating dependencies.
    Tracking,

    /// Deactivated with a completed dependency map; nothing changed yet.
    Tracked,

    /// At least one recorded dependency was written since the last window.
    Dirty,

    /// Torn down; the session is unlinked everywhere and inert.
    Retired,
}

/// Generation marker replaced wholesale whenever a session goes dirty.
#[derive(Debug, PartialEq, Eq)]
pub struct Epoch {
    ordinal: u64,
}

impl Epoch {
    /// How many times the session has been invalidated.
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }
}

/// Paths recorded against one store during the current window.
pub(crate) struct StoreDeps {
    pub(crate) store: Store,
    pub(crate) paths: HashSet<String>,
}

pub(crate) struct SessionInner {
    id: SessionId,

    /// Lifecycle phase.
    phase: RwLock<SessionPhase>,

    /// Dependency map for the most recent tracking window.
    deps: RwLock<HashMap<StoreId, StoreDeps>>,

    /// Identity-compared invalidation marker.
    epoch: RwLock<Arc<Epoch>>,
}

impl SessionInner {
    /// Whether `path` in `store` was read during the current window.
    pub(crate) fn depends_on_path(&self, store: StoreId, path: &str) -> bool {
        self.deps
            .read()
            .expect("dependency map lock poisoned")
            .get(&store)
            .map(|deps| deps.paths.contains(path))
            .unwrap_or(false)
    }

    /// Mark the session dirty: new epoch instance, Dirty phase.
    pub(crate) fn prepare_update(&self) {
        {
            let mut epoch = self.epoch.write().expect("epoch lock poisoned");
            let next = epoch.ordinal + 1;
            *epoch = Arc::new(Epoch { ordinal: next });
        }
        *self.phase.write().expect("phase lock poisoned") = SessionPhase::Dirty;
    }
}

/// A tracking context for one reactive computation.
///
/// Cloning a session shares the underlying context; stores hold weak
/// references to it, so dropping every clone without [`Session::retire`]
/// leaves only registry entries that are pruned on the next dispatch.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a new idle session.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                phase: RwLock::new(SessionPhase::Idle),
                deps: RwLock::new(HashMap::new()),
                epoch: RwLock::new(Arc::new(Epoch { ordinal: 0 })),
            }),
        }
    }

    /// Get the session's unique ID.
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Get the current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.read().expect("phase lock poisoned")
    }

    /// Whether a recorded dependency changed since the last window.
    pub fn is_dirty(&self) -> bool {
        self.phase() == SessionPhase::Dirty
    }

    /// The current epoch marker.
    ///
    /// Hosts keep the returned `Arc` and compare it against a later call
    /// with [`Arc::ptr_eq`]; a mismatch means the session went dirty in
    /// between.
    pub fn epoch(&self) -> Arc<Epoch> {
        Arc::clone(&self.inner.epoch.read().expect("epoch lock poisoned"))
    }

    /// Whether `path` in `store` was read during the current window.
    pub fn depends_on(&self, store: &Store, path: &str) -> bool {
        self.inner.depends_on_path(store.id(), path)
    }

    /// Number of stores the current dependency map covers.
    pub fn store_count(&self) -> usize {
        self.inner
            .deps
            .read()
            .expect("dependency map lock poisoned")
            .len()
    }

    /// Begin a fresh tracking window.
    ///
    /// Unlinks the session from every store registered during the previous
    /// window and reconstructs the dependency map, so stale observer
    /// registrations never accumulate across repeated runs.
    pub fn start_track(&self) {
        if self.phase() == SessionPhase::Retired {
            warn!(session = ?self.inner.id, "tracking requested on a retired session");
            return;
        }

        self.unlink_all();
        *self.inner.phase.write().expect("phase lock poisoned") = SessionPhase::Tracking;
    }

    /// Seal the current tracking window.
    ///
    /// Called by the tracking slot on deactivation. A session that went
    /// dirty during its own window (a re-entrant write) stays dirty.
    pub(crate) fn finish_track(&self) {
        let mut phase = self.inner.phase.write().expect("phase lock poisoned");
        if *phase == SessionPhase::Tracking {
            *phase = SessionPhase::Tracked;
        }
    }

    /// Record a read of `path` in `store`.
    ///
    /// The first path recorded against a store also links the session into
    /// that store's observer registry; repeated reads of the same path are
    /// idempotent.
    pub(crate) fn record(&self, store: &Store, path: String) {
        if self.phase() == SessionPhase::Retired {
            return;
        }

        let newly_linked = {
            let mut deps = self.inner.deps.write().expect("dependency map lock poisoned");
            match deps.entry(store.id()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().paths.insert(path);
                    false
                }
                Entry::Vacant(entry) => {
                    let mut paths = HashSet::new();
                    paths.insert(path);
                    entry.insert(StoreDeps {
                        store: store.clone(),
                        paths,
                    });
                    true
                }
            }
        };

        // Registry linking happens outside the dependency map lock.
        if newly_linked {
            store.register_observer(self);
        }
    }

    /// Run `body` inside a tracking window on this session.
    ///
    /// Scoped form of activate/deactivate: the slot is restored on every
    /// exit path, including unwinding out of `body`.
    pub fn track<R>(&self, body: impl FnOnce() -> R) -> R {
        let _guard = TrackGuard::begin(self);
        body()
    }

    /// Subscribe `listener` to every store in the dependency map.
    ///
    /// Returns a combined handle; cancelling it unsubscribes from all of
    /// them. Call this after a tracking window so the map is populated.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let listener: Arc<dyn Fn() + Send + Sync> = Arc::new(listener);

        let stores: Vec<Store> = self
            .inner
            .deps
            .read()
            .expect("dependency map lock poisoned")
            .values()
            .map(|deps| deps.store.clone())
            .collect();

        let entries = stores
            .into_iter()
            .map(|store| {
                let listener = Arc::clone(&listener);
                let id = store.subscribe(move || listener());
                (store, id)
            })
            .collect();

        Subscription { entries }
    }

    /// Permanently tear the session down.
    ///
    /// Unlinks from every store and moves to Retired; the session accepts
    /// no further tracking. Valid from a settled phase (Tracked or Dirty);
    /// calling it elsewhere is recovered with a warning, and the cleanup
    /// still runs.
    pub fn retire(&self) {
        match self.phase() {
            SessionPhase::Retired => return,
            SessionPhase::Tracked | SessionPhase::Dirty => {}
            other => {
                warn!(session = ?self.inner.id, phase = ?other, "session retired outside a settled phase");
            }
        }

        self.unlink_all();
        *self.inner.phase.write().expect("phase lock poisoned") = SessionPhase::Retired;
    }

    /// Remove this session from every store's observer registry.
    fn unlink_all(&self) {
        let stale: Vec<Store> = {
            let mut deps = self.inner.deps.write().expect("dependency map lock poisoned");
            deps.drain().map(|(_, deps)| deps.store).collect()
        };

        for store in stale {
            store.remove_observer(self.inner.id);
        }
    }

    pub(crate) fn inner(&self) -> &Arc<SessionInner> {
        &self.inner
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("phase", &self.phase())
            .field("store_count", &self.store_count())
            .finish()
    }
}

/// Combined unsubscribe handle returned by [`Session::subscribe`].
pub struct Subscription {
    entries: Vec<(Store, crate::state::ListenerId)>,
}

impl Subscription {
    /// Number of stores this subscription covers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the subscription covers no stores.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unsubscribe from every covered store.
    pub fn cancel(self) {
        for (store, id) in self.entries {
            store.unsubscribe(id);
        }
    }
}
