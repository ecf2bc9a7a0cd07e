// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Consumer interest in optional (dependent) properties.
//!
//! Consumers may subscribe and unsubscribe at any time, including while a
//! poll cycle is running. The poller takes one snapshot of the union per
//! cycle, so changes made mid-cycle apply to the next cycle.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::command::CommandRegistry;
use crate::device::response::{SyncError, SyncResult};
use crate::device::value::PropertyName;

/// Identifies one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug, Default)]
struct Subscriptions {
    next_id: u64,
    entries: HashMap<SubscriptionId, BTreeSet<PropertyName>>,
}

/// Tracks which properties live consumers want.
#[derive(Debug)]
pub struct InterestTracker {
    registry: Arc<CommandRegistry>,
    unsupported: BTreeSet<PropertyName>,
    inner: Mutex<Subscriptions>,
}

impl InterestTracker {
    /// Create a tracker, applying the device's capability filter once.
    ///
    /// Fails with `UnknownCommand` for a name the registry does not know, and
    /// with `InvalidRegistry` if the power or signal property is filtered out.
    pub fn new<I, N>(registry: Arc<CommandRegistry>, unsupported: I) -> SyncResult<Self>
    where
        I: IntoIterator<Item = N>,
        N: Into<PropertyName>,
    {
        let unsupported: BTreeSet<PropertyName> = unsupported.into_iter().map(Into::into).collect();
        for name in &unsupported {
            registry.describe(name.as_str())?;
            if *name == registry.power().property || *name == registry.signal().property {
                return Err(SyncError::invalid_registry(format!(
                    "'{}' drives the poller and cannot be marked unsupported",
                    name
                )));
            }
        }
        Ok(Self {
            registry,
            unsupported,
            inner: Mutex::new(Subscriptions::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Subscriptions> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a set of wanted properties.
    ///
    /// Unknown names are rejected up front; names the device does not support
    /// are dropped silently.
    pub fn subscribe<I, N>(&self, interest: I) -> SyncResult<SubscriptionId>
    where
        I: IntoIterator<Item = N>,
        N: Into<PropertyName>,
    {
        let mut wanted = BTreeSet::new();
        for name in interest.into_iter().map(Into::into) {
            self.registry.describe(name.as_str())?;
            if !self.unsupported.contains(&name) {
                wanted.insert(name);
            }
        }

        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.entries.insert(id, wanted);
        Ok(id)
    }

    /// Like [`subscribe`](Self::subscribe), but unsubscribes when the guard drops.
    pub fn subscribe_guarded<I, N>(self: &Arc<Self>, interest: I) -> SyncResult<Subscription>
    where
        I: IntoIterator<Item = N>,
        N: Into<PropertyName>,
    {
        let id = self.subscribe(interest)?;
        Ok(Subscription {
            tracker: Arc::clone(self),
            id,
        })
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().entries.remove(&id).is_some()
    }

    /// Union of every live subscription.
    pub fn active_interest(&self) -> BTreeSet<PropertyName> {
        self.lock()
            .entries
            .values()
            .flat_map(|set| set.iter().cloned())
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_supported(&self, name: &str) -> bool {
        !self.unsupported.contains(name)
    }

    pub fn unsupported(&self) -> &BTreeSet<PropertyName> {
        &self.unsupported
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }
}

/// Subscription guard returned by [`InterestTracker::subscribe_guarded`].
#[derive(Debug)]
pub struct Subscription {
    tracker: Arc<InterestTracker>,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.tracker.unsubscribe(self.id);
    }
}
