// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Device synchronization components.
//!
//! This module contains the polling core: consumer interest tracking, the
//! versioned state store, retry and cadence policies, the cycle poller and
//! the coordinator tying them to change notification.

pub mod cadence;
pub mod coordinator;
pub mod events;
pub mod interest;
pub mod policies;
pub mod poller;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use cadence::{CadenceController, CadenceEvent, CadenceState};
pub use coordinator::SyncCoordinator;
pub use events::{ChangeEmitter, ChangeListener, FnListener, ListenerId};
pub use interest::{InterestTracker, Subscription, SubscriptionId};
pub use policies::{FixedDelay, RetryPolicy};
pub use poller::{CycleOutcome, CycleReport, Poller};
pub use store::{Delta, StateSnapshot, StateStore};
