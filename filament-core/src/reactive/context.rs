//! Tracking Slot
//!
//! The tracking slot holds the observation session that is currently
//! recording reads on this thread, or nothing. Store handles peek at it on
//! every field access: occupied slot means reads are recorded, empty slot
//! means reads pass through untracked.
//!
//! # Implementation
//!
//! One thread-local cell, at most one occupant. This is not a stack:
//! [`TrackingSlot::activate`] swaps the occupant and hands the previous one
//! back to the caller, and [`TrackingSlot::deactivate`] restores it. Nested
//! activation is therefore legal and last-in-first-out by construction.
//! [`TrackGuard`] ties the restore to scope exit so the pairing survives
//! early returns and panics inside the tracked computation.

use std::cell::RefCell;

use super::session::Session;

thread_local! {
    /// The session currently recording reads on this thread.
    static ACTIVE_SESSION: RefCell<Option<Session>> = RefCell::new(None);
}

/// The per-thread single-occupant tracking register.
pub struct TrackingSlot;

impl TrackingSlot {
    /// Install `session` as the active occupant and return the previous one.
    ///
    /// The session's dependency map is reset as part of activation, so a
    /// tracking window always starts from a clean slate and stale store
    /// links from the prior run are removed. The caller must hand the
    /// returned occupant to [`TrackingSlot::deactivate`] exactly once.
    pub fn activate(session: &Session) -> Option<Session> {
        let previous =
            ACTIVE_SESSION.with(|slot| slot.borrow_mut().replace(session.clone()));
        session.start_track();
        previous
    }

    /// Restore `previous` as the occupant, sealing the outgoing session.
    ///
    /// The session being displaced moves from its tracking window into its
    /// settled state; reads after this point are no longer attributed to it.
    pub fn deactivate(previous: Option<Session>) {
        let finished =
            ACTIVE_SESSION.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), previous));
        if let Some(session) = finished {
            session.finish_track();
        }
    }

    /// The current occupant, if any.
    pub fn current() -> Option<Session> {
        ACTIVE_SESSION.with(|slot| slot.borrow().clone())
    }

    /// Whether any session is currently tracking on this thread.
    pub fn is_active() -> bool {
        ACTIVE_SESSION.with(|slot| slot.borrow().is_some())
    }
}

/// Guard that restores the previous occupant when dropped.
///
/// This makes activate/deactivate pairing structural: however the tracked
/// computation exits, the slot ends up back where it was.
pub struct TrackGuard {
    previous: Option<Session>,
}

impl TrackGuard {
    /// Activate `session` for the lifetime of the guard.
    pub fn begin(session: &Session) -> Self {
        Self {
            previous: TrackingSlot::activate(session),
        }
    }
}

impl Drop for TrackGuard {
    fn drop(&mut self) {
        TrackingSlot::deactivate(self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::SessionPhase;

    #[test]
    fn slot_starts_empty() {
        assert!(!TrackingSlot::is_active());
        assert!(TrackingSlot::current().is_none());
    }

    #[test]
    fn activate_and_deactivate_swap_the_occupant() {
        let session = Session::new();

        let previous = TrackingSlot::activate(&session);
        assert!(previous.is_none());
        assert!(TrackingSlot::is_active());
        assert_eq!(TrackingSlot::current().unwrap().id(), session.id());
        assert_eq!(session.phase(), SessionPhase::Tracking);

        TrackingSlot::deactivate(previous);
        assert!(!TrackingSlot::is_active());
        assert_eq!(session.phase(), SessionPhase::Tracked);
    }

    #[test]
    fn nested_activation_saves_and_restores() {
        let outer = Session::new();
        let inner = Session::new();

        let prev_outer = TrackingSlot::activate(&outer);
        let prev_inner = TrackingSlot::activate(&inner);

        // Inner evicted the outer session but kept a handle to restore.
        assert_eq!(TrackingSlot::current().unwrap().id(), inner.id());
        assert_eq!(prev_inner.as_ref().unwrap().id(), outer.id());

        TrackingSlot::deactivate(prev_inner);
        assert_eq!(TrackingSlot::current().unwrap().id(), outer.id());
        assert_eq!(inner.phase(), SessionPhase::Tracked);

        TrackingSlot::deactivate(prev_outer);
        assert!(!TrackingSlot::is_active());
    }

    #[test]
    fn guard_restores_on_scope_exit() {
        let session = Session::new();

        {
            let _guard = TrackGuard::begin(&session);
            assert!(TrackingSlot::is_active());
        }

        assert!(!TrackingSlot::is_active());
        assert_eq!(session.phase(), SessionPhase::Tracked);
    }

    #[test]
    fn guard_restores_on_panic() {
        let session = Session::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = TrackGuard::begin(&session);
            panic!("computation failed");
        }));

        assert!(result.is_err());
        assert!(!TrackingSlot::is_active());
    }
}
