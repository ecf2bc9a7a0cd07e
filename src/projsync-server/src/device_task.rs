// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Device task: one poll loop per configured device.
//!
//! The task exclusively owns the device transport. Scheduled cycles, consumer
//! requests and shutdown are multiplexed in a single `select!` loop, so
//! requests are always handled between cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use projsync_backend::{DeviceAccess, RegistrationContext};
use projsync_core::{
    CadenceController, ChangeEmitter, CommandRegistry, DeviceRequest, DynResult, FixedDelay,
    InterestTracker, Poller, RequestKind, StateSnapshot, SyncCoordinator, SyncError, SyncResult,
};

use crate::device_handle::DeviceHandle;

const DEVICE_TASK_CHANNEL_BUFFER: usize = 32;
const SLOW_CYCLE: Duration = Duration::from_secs(3);

/// Configuration for one device task.
pub struct DeviceTaskConfig {
    pub id: String,
    pub backends: Arc<RegistrationContext>,
    pub backend: String,
    pub access: DeviceAccess,
    pub registry: Arc<CommandRegistry>,
    pub unsupported: Vec<String>,
    /// Subscribed for the lifetime of the task.
    pub interest: Vec<String>,
    pub active_interval: Duration,
    pub idle_interval: Duration,
    pub retry: FixedDelay,
}

/// A device ready to run, not yet spawned.
pub struct DeviceTask {
    id: String,
    coordinator: SyncCoordinator,
    rx: mpsc::Receiver<DeviceRequest>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DeviceTask {
    /// Build the transport and the sync components for one device.
    ///
    /// Listeners registered on the returned handle before [`DeviceTask::spawn`]
    /// see the very first cycle.
    pub fn build(
        config: DeviceTaskConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> DynResult<(Self, DeviceHandle)> {
        let transport =
            config
                .backends
                .build_transport(&config.backend, config.access, &config.registry)?;
        let interest = Arc::new(InterestTracker::new(
            Arc::clone(&config.registry),
            config.unsupported.iter().map(String::as_str),
        )?);
        if !config.interest.is_empty() {
            interest.subscribe(config.interest.iter().map(String::as_str))?;
        }

        let poller = Poller::new(Arc::clone(&interest), transport, config.retry)
            .with_shutdown(shutdown_rx.clone());
        let cadence = CadenceController::for_registry(
            &config.registry,
            config.active_interval,
            config.idle_interval,
        );
        let emitter = Arc::new(ChangeEmitter::new());
        let coordinator = SyncCoordinator::new(poller, cadence, Arc::clone(&emitter));

        let (tx, rx) = mpsc::channel(DEVICE_TASK_CHANNEL_BUFFER);
        let handle = DeviceHandle::new(
            config.id.clone(),
            tx,
            coordinator.subscribe_state(),
            interest,
            emitter,
        );
        let task = Self {
            id: config.id,
            coordinator,
            rx,
            shutdown_rx,
        };
        Ok((task, handle))
    }

    pub fn spawn(self) -> JoinHandle<()> {
        let Self {
            id,
            coordinator,
            rx,
            shutdown_rx,
        } = self;
        tokio::spawn(async move {
            if let Err(e) = run_device_task(id.clone(), coordinator, rx, shutdown_rx).await {
                error!("[{}] Device task error: {}", id, e);
            }
        })
    }
}

/// Run the poll loop until shutdown or until every handle is dropped.
pub async fn run_device_task(
    id: String,
    mut coordinator: SyncCoordinator,
    mut rx: mpsc::Receiver<DeviceRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> DynResult<()> {
    let info = coordinator.poller().info().clone();
    info!(
        "[{}] Device task started ({} {}, {})",
        id, info.manufacturer, info.model, info.endpoint
    );

    // The first cycle runs right away.
    let mut poll_sleep = Box::pin(time::sleep(Duration::ZERO));
    loop {
        tokio::select! {
            _ = &mut poll_sleep => {
                if matches!(run_cycle(&id, &mut coordinator).await, Err(SyncError::Cancelled)) {
                    break;
                }
                poll_sleep.as_mut().reset(Instant::now() + coordinator.next_interval());
            },

            maybe_req = rx.recv() => {
                let Some(first_req) = maybe_req else { break; };

                // Batch up any pending requests
                let mut batch = vec![first_req];
                while let Ok(next) = rx.try_recv() {
                    batch.push(next);
                }

                let pending = apply_requests(&id, &mut coordinator, batch).await;
                if pending.is_empty() {
                    continue;
                }

                // Writes and refreshes are answered with the cycle that follows them.
                let result = run_cycle(&id, &mut coordinator)
                    .await
                    .map(|_| coordinator.snapshot());
                let cancelled = matches!(result, Err(SyncError::Cancelled));
                for respond_to in pending {
                    let _ = respond_to.send(result.clone());
                }
                if cancelled {
                    break;
                }
                poll_sleep.as_mut().reset(Instant::now() + coordinator.next_interval());
            },

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            },
        }
    }

    info!("[{}] Device task shutting down", id);
    coordinator.shutdown().await;
    Ok(())
}

/// Signal every device task to stop and wait until each has finished.
///
/// Tasks are never aborted. An exchange already in flight runs to its own
/// transport timeout, and the poller stops before the next one.
pub async fn shutdown_device_tasks(shutdown_tx: &watch::Sender<bool>, tasks: Vec<JoinHandle<()>>) {
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            error!("Device task ended abnormally: {}", e);
        }
    }
}

async fn run_cycle(id: &str, coordinator: &mut SyncCoordinator) -> SyncResult<()> {
    let started = Instant::now();
    let result = coordinator.run_cycle().await;
    let elapsed = started.elapsed();
    match result {
        Ok(report) => {
            if elapsed > SLOW_CYCLE {
                warn!("[{}] Poll cycle took {:?}", id, elapsed);
            }
            debug!(
                "[{}] Cycle done in {:?}: {} read, {} skipped, {} changed, {} attempt(s)",
                id,
                elapsed,
                report.attempted.len(),
                report.skipped.len(),
                report.changed.len(),
                report.attempts
            );
            Ok(())
        }
        Err(SyncError::Cancelled) => {
            debug!("[{}] Poll cycle cancelled", id);
            Err(SyncError::Cancelled)
        }
        Err(e) => {
            error!("[{}] Poll cycle failed: {}", id, e);
            Err(e)
        }
    }
}

/// Apply writes in arrival order; returns the requests waiting for a cycle.
async fn apply_requests(
    id: &str,
    coordinator: &mut SyncCoordinator,
    batch: Vec<DeviceRequest>,
) -> Vec<oneshot::Sender<SyncResult<StateSnapshot>>> {
    let mut pending = Vec::with_capacity(batch.len());
    for DeviceRequest { kind, respond_to } in batch {
        match kind {
            RequestKind::Refresh => pending.push(respond_to),
            RequestKind::Write(name, value) => {
                info!("[{}] Writing {} = {}", id, name, value);
                match coordinator.write(name.as_str(), value).await {
                    Ok(()) => pending.push(respond_to),
                    Err(e) => {
                        warn!("[{}] Write to {} failed: {}", id, name, e);
                        let _ = respond_to.send(Err(e));
                    }
                }
            }
        }
    }
    pending
}
