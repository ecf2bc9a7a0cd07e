// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

use crate::device::value::PropertyName;

/// Error returned by a single transport exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("device did not answer in time")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn other(detail: impl Into<String>) -> Self {
        Self::Other(detail.into())
    }
}

/// Error type returned by the synchronization core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("unknown command: {0}")]
    UnknownCommand(PropertyName),
    #[error("command not supported by this device: {0}")]
    Unsupported(PropertyName),
    #[error("timed out talking to device ({0})")]
    DeviceTimeout(PropertyName),
    #[error("transport error ({name}): {detail}")]
    Transport { name: PropertyName, detail: String },
    #[error("poll failed after {attempts} attempts: {last}")]
    PollExhausted { attempts: u32, last: Box<SyncError> },
    #[error("invalid command registry: {0}")]
    InvalidRegistry(String),
    #[error("device task cancelled")]
    Cancelled,
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Attach the property name to a transport failure.
    pub fn from_transport(name: &PropertyName, err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Self::DeviceTimeout(name.clone()),
            TransportError::Other(detail) => Self::Transport {
                name: name.clone(),
                detail,
            },
        }
    }

    pub fn invalid_registry(detail: impl Into<String>) -> Self {
        Self::InvalidRegistry(detail.into())
    }

    /// Only device timeouts are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DeviceTimeout(_))
    }
}
