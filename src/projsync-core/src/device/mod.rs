// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::device::response::TransportError;
use crate::device::value::{PropertyName, Value};

/// Alias to reduce type complexity in Transport.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

pub mod command;
pub mod controller;
pub mod request;
pub mod response;
pub mod value;

/// Static info describing a device backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    /// Human readable description of how the device is reached.
    pub endpoint: String,
}

/// Single request/response exchange with a remote device.
///
/// A transport is owned by exactly one device task. Every call is bounded by
/// the transport's own timeout, which surfaces as [`TransportError::Timeout`].
pub trait Transport: Send {
    fn info(&self) -> &DeviceInfo;

    /// Read the current value of one named property.
    fn read<'a>(&'a mut self, name: &'a PropertyName) -> TransportFuture<'a, Value>;

    /// Write one named property.
    fn write<'a>(&'a mut self, name: &'a PropertyName, value: Value) -> TransportFuture<'a, ()>;

    /// Release any held connection. Called once on device shutdown.
    fn close<'a>(&'a mut self) -> TransportFuture<'a, ()> {
        Box::pin(std::future::ready(Ok(())))
    }
}
