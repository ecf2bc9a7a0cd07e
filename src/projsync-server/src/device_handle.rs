// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Thin handle giving consumers access to one device's task and state.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use projsync_core::{
    ChangeEmitter, ChangeListener, DeviceRequest, InterestTracker, ListenerId, PropertyName,
    RequestKind, StateSnapshot, Subscription, SubscriptionId, SyncError, SyncResult, Value,
};

/// A handle to a single running device task.
///
/// Cloning is cheap; all clones talk to the same task.
#[derive(Clone)]
pub struct DeviceHandle {
    /// Stable device identifier.
    pub device_id: String,
    /// Send requests to the device task.
    pub device_tx: mpsc::Sender<DeviceRequest>,
    /// Watch the latest committed state.
    pub state_rx: watch::Receiver<StateSnapshot>,
    interest: Arc<InterestTracker>,
    emitter: Arc<ChangeEmitter>,
}

impl DeviceHandle {
    pub fn new(
        device_id: String,
        device_tx: mpsc::Sender<DeviceRequest>,
        state_rx: watch::Receiver<StateSnapshot>,
        interest: Arc<InterestTracker>,
        emitter: Arc<ChangeEmitter>,
    ) -> Self {
        Self {
            device_id,
            device_tx,
            state_rx,
            interest,
            emitter,
        }
    }

    pub fn subscribe<I, N>(&self, interest: I) -> SyncResult<SubscriptionId>
    where
        I: IntoIterator<Item = N>,
        N: Into<PropertyName>,
    {
        self.interest.subscribe(interest)
    }

    /// Like [`DeviceHandle::subscribe`] but released when the guard drops.
    pub fn subscribe_guarded<I, N>(&self, interest: I) -> SyncResult<Subscription>
    where
        I: IntoIterator<Item = N>,
        N: Into<PropertyName>,
    {
        self.interest.subscribe_guarded(interest)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.interest.unsubscribe(id)
    }

    pub fn register_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.emitter.register(listener)
    }

    /// Register a closure called with the keys changed by each cycle.
    pub fn on_change<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&BTreeSet<PropertyName>) + Send + Sync + 'static,
    {
        self.emitter.on_change(callback)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.emitter.unregister(id)
    }

    /// Latest committed state.
    pub fn snapshot(&self) -> StateSnapshot {
        self.state_rx.borrow().clone()
    }

    /// Write a property and wait for the cycle that follows it.
    pub async fn write(
        &self,
        name: impl Into<PropertyName>,
        value: impl Into<Value>,
    ) -> SyncResult<StateSnapshot> {
        self.request(RequestKind::Write(name.into(), value.into()))
            .await
    }

    /// Poll now instead of waiting for the next scheduled cycle.
    pub async fn refresh(&self) -> SyncResult<StateSnapshot> {
        self.request(RequestKind::Refresh).await
    }

    async fn request(&self, kind: RequestKind) -> SyncResult<StateSnapshot> {
        let (respond_to, response) = oneshot::channel();
        self.device_tx
            .send(DeviceRequest { kind, respond_to })
            .await
            .map_err(|_| SyncError::Cancelled)?;
        response.await.map_err(|_| SyncError::Cancelled)?
    }
}
