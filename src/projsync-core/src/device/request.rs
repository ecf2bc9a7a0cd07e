// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::sync::oneshot;

use crate::device::controller::StateSnapshot;
use crate::{PropertyName, SyncResult, Value};

/// Work a consumer asks the device task to do between poll cycles.
#[derive(Debug, Clone)]
pub enum RequestKind {
    /// Write one property, then poll again right away.
    Write(PropertyName, Value),
    /// Poll right away instead of waiting for the cadence interval.
    Refresh,
}

/// Request sent to the device task.
#[derive(Debug)]
pub struct DeviceRequest {
    pub kind: RequestKind,
    pub respond_to: oneshot::Sender<SyncResult<StateSnapshot>>,
}
