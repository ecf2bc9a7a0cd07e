// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Polling cadence state machine.
//!
//! The device is polled on a short interval while it is on and on a long
//! interval while it reports an off/standby power value.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::device::command::CommandRegistry;
use crate::device::value::Value;

/// Events that can trigger cadence transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceEvent {
    /// Power property reported an off/standby value
    PoweredDown,
    /// Power property reported any other value
    PoweredUp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CadenceState {
    #[default]
    Active,
    Idle,
}

impl fmt::Display for CadenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Idle => write!(f, "Idle"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CadenceController {
    active_interval: Duration,
    idle_interval: Duration,
    off_values: BTreeSet<Value>,
    state: CadenceState,
    transition_count: u64,
}

impl CadenceController {
    /// Create a controller in the Active state.
    pub fn new(
        active_interval: Duration,
        idle_interval: Duration,
        off_values: BTreeSet<Value>,
    ) -> Self {
        Self {
            active_interval,
            idle_interval,
            off_values,
            state: CadenceState::Active,
            transition_count: 0,
        }
    }

    /// Controller using the registry's power off values.
    pub fn for_registry(
        registry: &CommandRegistry,
        active_interval: Duration,
        idle_interval: Duration,
    ) -> Self {
        Self::new(
            active_interval,
            idle_interval,
            registry.power().off_values.clone(),
        )
    }

    pub fn state(&self) -> CadenceState {
        self.state
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Interval to wait before starting the next cycle.
    pub fn interval(&self) -> Duration {
        match self.state {
            CadenceState::Active => self.active_interval,
            CadenceState::Idle => self.idle_interval,
        }
    }

    /// Feed the power value observed this cycle.
    ///
    /// `None` means the property could not be read and leaves the state as is.
    /// Returns true if a transition occurred.
    pub fn observe(&mut self, power: Option<&Value>) -> bool {
        let Some(value) = power else {
            return false;
        };
        let event = if self.off_values.contains(value) {
            CadenceEvent::PoweredDown
        } else {
            CadenceEvent::PoweredUp
        };
        self.process_event(event)
    }

    /// Process an event and potentially transition to a new state.
    pub fn process_event(&mut self, event: CadenceEvent) -> bool {
        match self.next_state(event) {
            Some(state) => {
                self.state = state;
                self.transition_count += 1;
                true
            }
            None => false,
        }
    }

    fn next_state(&self, event: CadenceEvent) -> Option<CadenceState> {
        match (self.state, event) {
            (CadenceState::Active, CadenceEvent::PoweredDown) => Some(CadenceState::Idle),
            (CadenceState::Idle, CadenceEvent::PoweredUp) => Some(CadenceState::Active),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> CadenceController {
        CadenceController::new(
            Duration::from_secs(5),
            Duration::from_secs(10),
            [Value::from("standby")].into_iter().collect(),
        )
    }

    #[test]
    fn test_starts_active() {
        let cadence = controller();
        assert_eq!(cadence.state(), CadenceState::Active);
        assert_eq!(cadence.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_off_then_on() {
        let mut cadence = controller();

        assert!(cadence.observe(Some(&Value::from("standby"))));
        assert_eq!(cadence.interval(), Duration::from_secs(10));

        assert!(cadence.observe(Some(&Value::from("on"))));
        assert_eq!(cadence.interval(), Duration::from_secs(5));
        assert_eq!(cadence.transition_count(), 2);
    }

    #[test]
    fn test_unread_power_keeps_state() {
        let mut cadence = controller();
        cadence.observe(Some(&Value::from("standby")));
        assert!(!cadence.observe(None));
        assert_eq!(cadence.state(), CadenceState::Idle);
    }

    #[test]
    fn test_non_off_values_are_active() {
        let mut cadence = controller();
        assert!(!cadence.observe(Some(&Value::from("warming"))));
        assert!(!cadence.observe(Some(&Value::from("on"))));
        assert_eq!(cadence.state(), CadenceState::Active);
        assert_eq!(cadence.transition_count(), 0);
    }
}
