// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! One synchronization cycle against a device.
//!
//! A cycle reads every core command (power first), branches on the power and
//! signal values, then reads the dependent commands consumers want whose
//! prerequisite currently holds an allowed value. Reads are collected into a
//! cycle-local delta that is committed to the store only if the whole cycle
//! succeeds.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::device::command::CommandRegistry;
use crate::device::response::{SyncError, SyncResult};
use crate::device::value::{PropertyName, Value};
use crate::device::{DeviceInfo, Transport};

use super::interest::InterestTracker;
use super::policies::RetryPolicy;
use super::store::{Delta, StateSnapshot, StateStore};

/// Result of the read phase of a single attempt, before it is committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub delta: Delta,
    /// Power value read this cycle.
    pub power: Option<Value>,
    /// Non-core entries must be cleared when this outcome is committed.
    pub signal_lost: bool,
    /// Properties read from the transport, in order.
    pub attempted: Vec<PropertyName>,
    /// Wanted dependents whose prerequisite did not allow a read.
    pub skipped: BTreeSet<PropertyName>,
}

/// Summary of a committed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Keys added, changed or removed by the commit.
    pub changed: BTreeSet<PropertyName>,
    pub power: Option<Value>,
    pub signal_lost: bool,
    /// Attempts used, initial try included.
    pub attempts: u32,
    pub attempted: Vec<PropertyName>,
    pub skipped: BTreeSet<PropertyName>,
}

/// Owns the transport and the state store of one device.
pub struct Poller {
    registry: Arc<CommandRegistry>,
    interest: Arc<InterestTracker>,
    transport: Box<dyn Transport>,
    retry: Box<dyn RetryPolicy>,
    store: StateStore,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Poller {
    pub fn new(
        interest: Arc<InterestTracker>,
        transport: Box<dyn Transport>,
        retry: impl RetryPolicy + 'static,
    ) -> Self {
        Self {
            registry: Arc::clone(interest.registry()),
            interest,
            transport,
            retry: Box::new(retry),
            store: StateStore::new(),
            shutdown: None,
        }
    }

    /// Abort at the next transport call once `shutdown` turns true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn interest(&self) -> &Arc<InterestTracker> {
        &self.interest
    }

    pub fn info(&self) -> &DeviceInfo {
        self.transport.info()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.store.snapshot()
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn sleep_or_cancel(&mut self, delay: Duration) -> SyncResult<()> {
        match self.shutdown.as_mut() {
            Some(rx) => {
                tokio::select! {
                    _ = time::sleep(delay) => Ok(()),
                    _ = wait_for_shutdown(rx) => Err(SyncError::Cancelled),
                }
            }
            None => {
                time::sleep(delay).await;
                Ok(())
            }
        }
    }

    async fn read(&mut self, name: &PropertyName) -> SyncResult<Value> {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        self.transport
            .read(name)
            .await
            .map_err(|e| SyncError::from_transport(name, e))
    }

    /// True when the store does not already hold the no-signal value.
    fn signal_transition(&self) -> bool {
        let signal = self.registry.signal();
        self.store.get(signal.property.as_str()) != Some(&signal.no_signal)
    }

    /// Run one cycle under the retry policy and commit it on success.
    ///
    /// A failed attempt is discarded entirely; the store only ever sees
    /// complete cycles.
    pub async fn poll(&mut self) -> SyncResult<CycleReport> {
        let mut attempt: u32 = 0;
        loop {
            match self.attempt_cycle().await {
                Ok(outcome) => {
                    let core = outcome.signal_lost.then(|| self.registry.core_set());
                    let changed = self.store.commit(core.as_ref(), &outcome.delta);
                    debug!(
                        "Cycle committed: {} read, {} skipped, {} changed",
                        outcome.attempted.len(),
                        outcome.skipped.len(),
                        changed.len()
                    );
                    return Ok(CycleReport {
                        changed,
                        power: outcome.power,
                        signal_lost: outcome.signal_lost,
                        attempts: attempt + 1,
                        attempted: outcome.attempted,
                        skipped: outcome.skipped,
                    });
                }
                Err(err) if self.retry.should_retry(attempt, &err) => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        "{}; retrying cycle (attempt {} of {}, delay {:?})",
                        err,
                        attempt + 2,
                        self.retry.max_attempts(),
                        delay
                    );
                    self.sleep_or_cancel(delay).await?;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(SyncError::PollExhausted {
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Read phase of a single attempt. Does not touch the store.
    pub async fn attempt_cycle(&mut self) -> SyncResult<CycleOutcome> {
        let registry = Arc::clone(&self.registry);
        let power = &registry.power().property;
        let signal = registry.signal();
        let mut outcome = CycleOutcome::default();

        for name in registry.core_commands() {
            // Power is read first; a device in standby ignores everything else.
            if outcome
                .power
                .as_ref()
                .is_some_and(|p| registry.is_power_off(p))
            {
                break;
            }
            if !self.interest.is_supported(name.as_str()) {
                continue;
            }
            let value = self.read(name).await?;
            outcome.attempted.push(name.clone());
            if name == power {
                outcome.power = Some(value.clone());
            }
            outcome.delta.insert(name.clone(), value);
        }

        if outcome
            .power
            .as_ref()
            .is_some_and(|p| registry.is_power_off(p))
        {
            if self.signal_transition() {
                info!("Device is off, dropping non-core state");
                outcome.signal_lost = true;
            }
            outcome
                .delta
                .insert(signal.property.clone(), signal.no_signal.clone());
            return Ok(outcome);
        }

        if outcome
            .delta
            .get(signal.property.as_str())
            .is_some_and(|v| registry.is_signal_lost(v))
        {
            if self.signal_transition() {
                warn!("Device lost signal, dropping non-core state");
            }
            outcome.signal_lost = true;
            return Ok(outcome);
        }

        // Dependents are evaluated against the values just read.
        for name in self.interest.active_interest() {
            let descriptor = registry.describe(name.as_str())?;
            let Some(dep) = descriptor.depends_on.as_ref() else {
                continue;
            };
            let current = outcome
                .delta
                .get(dep.prerequisite.as_str())
                .or_else(|| self.store.get(dep.prerequisite.as_str()));
            if !dep.is_satisfied_by(current) {
                outcome.skipped.insert(name);
                continue;
            }
            let value = self.read(&name).await?;
            outcome.attempted.push(name.clone());
            outcome.delta.insert(name, value);
        }

        Ok(outcome)
    }

    /// Write one property. The store is left alone; the next cycle reads it back.
    pub async fn write(&mut self, name: &str, value: Value) -> SyncResult<()> {
        let name = self.registry.describe(name)?.name.clone();
        if !self.interest.is_supported(name.as_str()) {
            return Err(SyncError::Unsupported(name));
        }
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        debug!("Writing {} = {}", name, value);
        self.transport
            .write(&name, value)
            .await
            .map_err(|e| SyncError::from_transport(&name, e))
    }

    /// Release the transport and drop all known state.
    pub async fn close(&mut self) {
        if let Err(e) = self.transport.close().await {
            warn!("Closing transport failed: {}", e);
        }
        self.store.clear();
    }
}

/// Resolves once the watched flag turns true. A dropped sender never cancels.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::controller::policies::FixedDelay;
    use crate::device::controller::testing::{MockHandle, MockTransport};

    fn registry() -> Arc<CommandRegistry> {
        Arc::new(
            CommandRegistry::builder()
                .power("power", ["standby"])
                .signal("signal", "none")
                .command("mode")
                .dependent("brightness", "mode", ["manual"])
                .dependent("hdr_level", "mode", ["hdr"])
                .build()
                .unwrap(),
        )
    }

    fn poller_with(max_retries: u32, unsupported: &[&str]) -> (Poller, MockHandle) {
        let interest =
            Arc::new(InterestTracker::new(registry(), unsupported.iter().copied()).unwrap());
        let (transport, handle) = MockTransport::new(&[
            ("power", Value::from("on")),
            ("signal", Value::from("ok")),
            ("mode", Value::from("manual")),
            ("brightness", Value::from(10i64)),
            ("hdr_level", Value::from(3i64)),
        ]);
        let poller = Poller::new(
            interest,
            Box::new(transport),
            FixedDelay::new(max_retries, Duration::from_secs(1)),
        );
        (poller, handle)
    }

    fn names(list: &[&str]) -> Vec<PropertyName> {
        list.iter().map(|n| PropertyName::from(*n)).collect()
    }

    #[tokio::test]
    async fn test_core_commands_read_without_interest() {
        let (mut poller, handle) = poller_with(0, &[]);
        let report = poller.poll().await.unwrap();

        assert_eq!(report.attempted, names(&["power", "signal", "mode"]));
        assert_eq!(handle.reads(), vec!["power", "signal", "mode"]);
        assert_eq!(poller.store().len(), 3);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_dependent_gated_by_prerequisite() {
        let (mut poller, handle) = poller_with(0, &[]);
        poller
            .interest()
            .subscribe(["brightness", "hdr_level"])
            .unwrap();

        // Cycle 1: mode=manual, brightness readable
        let report = poller.poll().await.unwrap();
        assert!(report.attempted.contains(&"brightness".into()));
        assert!(report.skipped.contains("hdr_level"));
        assert_eq!(poller.store().get("brightness"), Some(&Value::from(10i64)));

        // Cycle 2: mode=auto, brightness left untouched
        handle.set("mode", "auto");
        handle.set("brightness", 99i64);
        handle.clear_reads();
        let report = poller.poll().await.unwrap();
        assert!(!handle.reads().contains(&"brightness".to_string()));
        assert!(report.skipped.contains("brightness"));
        assert!(!report.changed.contains("brightness"));
        assert_eq!(poller.store().get("brightness"), Some(&Value::from(10i64)));
        assert_eq!(poller.store().get("mode"), Some(&Value::from("auto")));
    }

    #[tokio::test]
    async fn test_dependents_read_after_core() {
        let (mut poller, handle) = poller_with(0, &[]);
        poller.interest().subscribe(["brightness"]).unwrap();
        poller.poll().await.unwrap();
        assert_eq!(handle.reads(), vec!["power", "signal", "mode", "brightness"]);
    }

    #[tokio::test]
    async fn test_power_off_skips_everything_else() {
        let (mut poller, handle) = poller_with(0, &[]);
        poller.interest().subscribe(["brightness"]).unwrap();
        poller.poll().await.unwrap();
        assert!(poller.store().get("brightness").is_some());

        handle.set("power", "standby");
        handle.clear_reads();
        let report = poller.poll().await.unwrap();

        assert_eq!(handle.reads(), vec!["power"]);
        assert!(report.signal_lost);
        assert_eq!(report.power, Some(Value::from("standby")));
        assert_eq!(poller.store().get("signal"), Some(&Value::from("none")));
        assert!(poller.store().get("brightness").is_none());
        assert!(report.changed.contains("brightness"));

        // Already without signal: no second invalidation
        let report = poller.poll().await.unwrap();
        assert!(!report.signal_lost);
        assert!(report.changed.is_empty());
    }

    #[tokio::test]
    async fn test_signal_loss_clears_exactly_non_core() {
        let registry = Arc::new(
            CommandRegistry::builder()
                .power("power", ["standby"])
                .signal("signal", "none")
                .command("mode")
                .dependent("x", "mode", ["manual"])
                .dependent("y", "mode", ["manual"])
                .build()
                .unwrap(),
        );
        let interest = Arc::new(InterestTracker::new(registry, Vec::<&str>::new()).unwrap());
        interest.subscribe(["x", "y"]).unwrap();
        let (transport, handle) = MockTransport::new(&[
            ("power", Value::from("on")),
            ("signal", Value::from("ok")),
            ("mode", Value::from("manual")),
            ("x", Value::from(1i64)),
            ("y", Value::from(2i64)),
        ]);
        let mut poller = Poller::new(
            interest,
            Box::new(transport),
            FixedDelay::new(0, Duration::ZERO),
        );
        poller.poll().await.unwrap();
        assert_eq!(poller.store().len(), 5);

        handle.set("signal", "none");
        let report = poller.poll().await.unwrap();
        assert!(report.signal_lost);
        let snapshot = poller.snapshot();
        let keys: Vec<&str> = snapshot.values.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["mode", "power", "signal"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound() {
        let (mut poller, handle) = poller_with(3, &[]);
        handle.time_out_always();

        let err = poller.poll().await.unwrap_err();
        match err {
            SyncError::PollExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(*last, SyncError::DeviceTimeout("power".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(handle.reads().len(), 4);
        assert!(poller.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_timeout_recovers() {
        let (mut poller, handle) = poller_with(12, &[]);
        handle.time_out_next(2);

        let started = time::Instant::now();
        let report = poller.poll().await.unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(poller.store().get("power"), Some(&Value::from("on")));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let (mut poller, handle) = poller_with(12, &[]);
        handle.fail_on("signal");

        let err = poller.poll().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
        assert_eq!(handle.reads(), vec!["power", "signal"]);
        assert!(poller.store().is_empty());
    }

    #[tokio::test]
    async fn test_partial_cycle_is_discarded() {
        let (mut poller, handle) = poller_with(0, &[]);
        poller.interest().subscribe(["brightness"]).unwrap();
        poller.poll().await.unwrap();
        let before = poller.snapshot();

        handle.set("mode", "hdr");
        handle.time_out_on("hdr_level");
        poller.interest().subscribe(["hdr_level"]).unwrap();

        let err = poller.poll().await.unwrap_err();
        assert!(matches!(err, SyncError::PollExhausted { attempts: 1, .. }));
        assert_eq!(poller.snapshot(), before);
    }

    #[tokio::test]
    async fn test_unsupported_core_command_is_skipped() {
        let (mut poller, handle) = poller_with(0, &["mode"]);
        poller.poll().await.unwrap();
        assert_eq!(handle.reads(), vec!["power", "signal"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_transport_call() {
        let (poller, handle) = poller_with(0, &[]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut poller = poller.with_shutdown(shutdown_rx);
        shutdown_tx.send(true).unwrap();

        assert_eq!(poller.poll().await, Err(SyncError::Cancelled));
        assert!(handle.reads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_retry_delay() {
        let (poller, handle) = poller_with(5, &[]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut poller = poller.with_shutdown(shutdown_rx);
        handle.time_out_always();

        let started = time::Instant::now();
        let (result, _) = tokio::join!(poller.poll(), async {
            time::sleep(Duration::from_millis(500)).await;
            shutdown_tx.send(true).unwrap();
        });

        assert_eq!(result, Err(SyncError::Cancelled));
        // The 1s retry delay was cut short
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(handle.reads(), vec!["power"]);
        assert!(poller.store().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_between_core_reads() {
        let (poller, handle) = poller_with(5, &[]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut poller = poller.with_shutdown(shutdown_rx);
        handle.on_read("power", move || {
            let _ = shutdown_tx.send(true);
        });

        assert_eq!(poller.poll().await, Err(SyncError::Cancelled));
        assert_eq!(handle.reads(), vec!["power"]);
        assert!(poller.store().is_empty());
    }

    #[tokio::test]
    async fn test_write_validation() {
        let (mut poller, handle) = poller_with(0, &["hdr_level"]);

        assert_eq!(
            poller.write("lens", Value::from(1i64)).await,
            Err(SyncError::UnknownCommand("lens".into()))
        );
        assert_eq!(
            poller.write("hdr_level", Value::from(1i64)).await,
            Err(SyncError::Unsupported("hdr_level".into()))
        );
        poller.write("mode", Value::from("hdr")).await.unwrap();
        assert_eq!(handle.writes(), vec![("mode".to_string(), Value::from("hdr"))]);
        assert!(poller.store().is_empty());
    }
}
