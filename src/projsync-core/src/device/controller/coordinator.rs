// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::device::response::{SyncError, SyncResult};
use crate::device::value::Value;

use super::cadence::CadenceController;
use super::events::ChangeEmitter;
use super::interest::InterestTracker;
use super::poller::{CycleReport, Poller};
use super::store::StateSnapshot;

/// Drives a [`Poller`] and fans its results out to consumers.
///
/// After each cycle the committed snapshot is published on a watch channel,
/// listeners are notified and the cadence controller sees the power value.
pub struct SyncCoordinator {
    poller: Poller,
    cadence: CadenceController,
    emitter: Arc<ChangeEmitter>,
    state_tx: watch::Sender<StateSnapshot>,
    cycles: u64,
    failures: u64,
}

impl SyncCoordinator {
    pub fn new(poller: Poller, cadence: CadenceController, emitter: Arc<ChangeEmitter>) -> Self {
        let (state_tx, _) = watch::channel(poller.snapshot());
        Self {
            poller,
            cadence,
            emitter,
            state_tx,
            cycles: 0,
            failures: 0,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<StateSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn emitter(&self) -> &Arc<ChangeEmitter> {
        &self.emitter
    }

    pub fn interest(&self) -> &Arc<InterestTracker> {
        self.poller.interest()
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn cadence(&self) -> &CadenceController {
        &self.cadence
    }

    /// Delay before the next scheduled cycle.
    pub fn next_interval(&self) -> Duration {
        self.cadence.interval()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.poller.snapshot()
    }

    /// Cycles started and cycles that failed. Cancelled cycles are not failures.
    pub fn stats(&self) -> (u64, u64) {
        (self.cycles, self.failures)
    }

    pub async fn run_cycle(&mut self) -> SyncResult<CycleReport> {
        self.cycles += 1;
        let report = match self.poller.poll().await {
            Ok(report) => report,
            // Shutdown is not a device failure.
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            Err(err) => {
                self.failures += 1;
                self.emitter.notify_cycle_failed(&err);
                return Err(err);
            }
        };

        if !report.changed.is_empty() {
            let snapshot = self.poller.snapshot();
            self.state_tx.send_replace(snapshot.clone());
            self.emitter.notify_change(&report.changed, &snapshot);
        }

        if self.cadence.observe(report.power.as_ref()) {
            let state = self.cadence.state();
            let interval = self.cadence.interval();
            info!("Polling cadence now {} ({:?})", state, interval);
            self.emitter.notify_cadence_change(state, interval);
        }

        Ok(report)
    }

    pub async fn write(&mut self, name: &str, value: Value) -> SyncResult<()> {
        self.poller.write(name, value).await
    }

    /// Close the transport and publish the emptied store.
    pub async fn shutdown(&mut self) {
        self.poller.close().await;
        self.state_tx.send_replace(self.poller.snapshot());
    }
}
