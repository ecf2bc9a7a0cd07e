// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dummy projector backend for development and testing.
//!
//! Holds device state in memory and responds to all commands immediately.
//! Like a real projector in standby it only answers power queries while off;
//! every other command times out.

use std::collections::{BTreeMap, BTreeSet};

use projsync_core::{
    CommandRegistry, DeviceInfo, PropertyName, Transport, TransportError, TransportFuture, Value,
};
use tracing::debug;

pub struct DummyProjector {
    info: DeviceInfo,
    values: BTreeMap<PropertyName, Value>,
    power: PropertyName,
    off_values: BTreeSet<Value>,
    signal: PropertyName,
    no_signal: Value,
    /// Signal value restored when the projector powers back on.
    signal_when_on: Value,
}

impl DummyProjector {
    pub fn new(registry: &CommandRegistry, initial: BTreeMap<PropertyName, Value>) -> Self {
        let power = registry.power().property.clone();
        let signal = registry.signal().property.clone();
        let mut values: BTreeMap<PropertyName, Value> = registry
            .names()
            .map(|name| (name.clone(), Value::Int(0)))
            .collect();
        values.insert(power.clone(), Value::text("on"));
        values.insert(signal.clone(), Value::text("ok"));
        values.extend(initial);
        let signal_when_on = values
            .get(&signal)
            .filter(|v| **v != registry.signal().no_signal)
            .cloned()
            .unwrap_or_else(|| Value::text("ok"));

        Self {
            info: DeviceInfo {
                manufacturer: "Dummy".to_string(),
                model: "dummy".to_string(),
                endpoint: "memory".to_string(),
            },
            values,
            power,
            off_values: registry.power().off_values.clone(),
            signal,
            no_signal: registry.signal().no_signal.clone(),
            signal_when_on,
        }
    }

    fn is_off(&self) -> bool {
        self.values
            .get(&self.power)
            .is_some_and(|v| self.off_values.contains(v))
    }

    fn read_value(&self, name: &PropertyName) -> Result<Value, TransportError> {
        if self.is_off() && *name != self.power {
            return Err(TransportError::Timeout);
        }
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| TransportError::other(format!("unknown property {}", name)))
    }

    fn write_value(&mut self, name: &PropertyName, value: Value) -> Result<(), TransportError> {
        if !self.values.contains_key(name) {
            return Err(TransportError::other(format!("unknown property {}", name)));
        }
        if *name == self.power {
            let signal = if self.off_values.contains(&value) {
                self.no_signal.clone()
            } else {
                self.signal_when_on.clone()
            };
            self.values.insert(self.signal.clone(), signal);
        } else if self.is_off() {
            return Err(TransportError::Timeout);
        } else if *name == self.signal && value != self.no_signal {
            self.signal_when_on = value.clone();
        }
        debug!("dummy: {} = {}", name, value);
        self.values.insert(name.clone(), value);
        Ok(())
    }
}

impl Transport for DummyProjector {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn read<'a>(&'a mut self, name: &'a PropertyName) -> TransportFuture<'a, Value> {
        Box::pin(async move { self.read_value(name) })
    }

    fn write<'a>(&'a mut self, name: &'a PropertyName, value: Value) -> TransportFuture<'a, ()> {
        Box::pin(async move { self.write_value(name, value) })
    }
}
