// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod device;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use device::command::{CommandDescriptor, CommandRegistry, Dependency, RegistryBuilder};
pub use device::controller::{
    CadenceController, CadenceState, ChangeEmitter, ChangeListener, CycleReport, FixedDelay,
    FnListener, InterestTracker, ListenerId, Poller, RetryPolicy, StateSnapshot, Subscription,
    SubscriptionId, SyncCoordinator,
};
pub use device::request::{DeviceRequest, RequestKind};
pub use device::response::{SyncError, SyncResult, TransportError};
pub use device::value::{PropertyName, Value};
pub use device::{DeviceInfo, Transport, TransportFuture};
