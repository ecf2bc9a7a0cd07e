// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Change notification for device state consumers.
//!
//! Listeners are told which properties changed after each committed cycle,
//! and may optionally observe failed cycles and cadence transitions.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::device::response::SyncError;
use crate::device::value::PropertyName;

use super::cadence::CadenceState;
use super::store::StateSnapshot;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Trait for components that want to receive device state events.
///
/// All methods have default no-op implementations, so listeners can
/// selectively override only the events they care about.
pub trait ChangeListener: Send + Sync {
    /// Called after a cycle that changed at least one property.
    fn on_change(&self, _changed: &BTreeSet<PropertyName>, _snapshot: &StateSnapshot) {}

    /// Called when a whole cycle failed and nothing was merged.
    fn on_cycle_failed(&self, _error: &SyncError) {}

    /// Called when the polling cadence switches between active and idle.
    fn on_cadence_change(&self, _state: CadenceState, _interval: Duration) {}
}

/// Adapter turning a closure into a change-only listener.
pub struct FnListener<F>(pub F);

impl<F> ChangeListener for FnListener<F>
where
    F: Fn(&BTreeSet<PropertyName>) + Send + Sync,
{
    fn on_change(&self, changed: &BTreeSet<PropertyName>, _snapshot: &StateSnapshot) {
        (self.0)(changed)
    }
}

/// Manages registered listeners and dispatches events.
///
/// Registration goes through `&self` so consumers can add listeners through a
/// shared handle while the device task is running.
#[derive(Default)]
pub struct ChangeEmitter {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
}

impl ChangeEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Arc<dyn ChangeListener>)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Listeners are called outside the lock so they may register others.
    fn each(&self, f: impl Fn(&dyn ChangeListener)) {
        let listeners: Vec<Arc<dyn ChangeListener>> =
            self.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            f(listener.as_ref());
        }
    }

    /// Register a listener to receive events.
    /// Returns an ID that can be used to unregister the listener.
    pub fn register(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId::new();
        self.lock().push((id, listener));
        id
    }

    /// Register a closure called with the changed keys.
    pub fn on_change<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&BTreeSet<PropertyName>) + Send + Sync + 'static,
    {
        self.register(Arc::new(FnListener(callback)))
    }

    /// Returns false if no listener had that ID.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    pub fn notify_change(&self, changed: &BTreeSet<PropertyName>, snapshot: &StateSnapshot) {
        if changed.is_empty() {
            return;
        }
        self.each(|l| l.on_change(changed, snapshot));
    }

    pub fn notify_cycle_failed(&self, error: &SyncError) {
        self.each(|l| l.on_cycle_failed(error));
    }

    pub fn notify_cadence_change(&self, state: CadenceState, interval: Duration) {
        self.each(|l| l.on_cadence_change(state, interval));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct TestListener {
        changes: AtomicUsize,
        failed: AtomicBool,
    }

    impl TestListener {
        fn new() -> Self {
            Self {
                changes: AtomicUsize::new(0),
                failed: AtomicBool::new(false),
            }
        }
    }

    impl ChangeListener for TestListener {
        fn on_change(&self, changed: &BTreeSet<PropertyName>, _snapshot: &StateSnapshot) {
            self.changes.fetch_add(changed.len(), Ordering::Relaxed);
        }

        fn on_cycle_failed(&self, _error: &SyncError) {
            self.failed.store(true, Ordering::Relaxed);
        }
    }

    fn changed(names: &[&str]) -> BTreeSet<PropertyName> {
        names.iter().map(|n| PropertyName::from(*n)).collect()
    }

    #[test]
    fn test_register_and_notify() {
        let emitter = ChangeEmitter::new();
        let listener = Arc::new(TestListener::new());
        let id = emitter.register(listener.clone());
        assert_eq!(emitter.listener_count(), 1);

        emitter.notify_change(&changed(&["power", "input"]), &StateSnapshot::default());
        assert_eq!(listener.changes.load(Ordering::Relaxed), 2);
        assert!(!listener.failed.load(Ordering::Relaxed));

        emitter.notify_cycle_failed(&SyncError::Cancelled);
        assert!(listener.failed.load(Ordering::Relaxed));

        assert!(emitter.unregister(id));
        assert!(!emitter.unregister(id));
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_empty_change_set_is_not_delivered() {
        let emitter = ChangeEmitter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        emitter.on_change(move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        });

        emitter.notify_change(&BTreeSet::new(), &StateSnapshot::default());
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        emitter.notify_change(&changed(&["signal"]), &StateSnapshot::default());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
