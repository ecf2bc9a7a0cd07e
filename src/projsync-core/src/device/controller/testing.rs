// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Scripted in-memory transport for controller tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::response::TransportError;
use crate::device::value::{PropertyName, Value};
use crate::device::{DeviceInfo, Transport, TransportFuture};

type ReadHook = Box<dyn Fn() + Send>;

#[derive(Default)]
struct Script {
    values: BTreeMap<String, Value>,
    reads: Vec<String>,
    writes: Vec<(String, Value)>,
    /// Upcoming reads that time out; `u32::MAX` never runs out.
    timeouts: u32,
    timeout_on: Option<String>,
    fail_on: Option<String>,
    /// Runs after a read of the named property has been answered.
    on_read: Option<(String, ReadHook)>,
}

pub struct MockTransport {
    info: DeviceInfo,
    script: Arc<Mutex<Script>>,
}

/// Test-side view of a [`MockTransport`] after it moved into a poller.
#[derive(Clone)]
pub struct MockHandle {
    script: Arc<Mutex<Script>>,
}

impl MockTransport {
    pub fn new(values: &[(&str, Value)]) -> (Self, MockHandle) {
        let script = Script {
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            ..Script::default()
        };
        let script = Arc::new(Mutex::new(script));
        let transport = Self {
            info: DeviceInfo {
                manufacturer: "Test".to_string(),
                model: "Mock".to_string(),
                endpoint: "mock".to_string(),
            },
            script: script.clone(),
        };
        (transport, MockHandle { script })
    }
}

impl Transport for MockTransport {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn read<'a>(&'a mut self, name: &'a PropertyName) -> TransportFuture<'a, Value> {
        let mut script = self.script.lock().unwrap();
        script.reads.push(name.to_string());
        let result = if script.timeouts > 0 {
            if script.timeouts != u32::MAX {
                script.timeouts -= 1;
            }
            Err(TransportError::Timeout)
        } else if script.timeout_on.as_deref() == Some(name.as_str()) {
            Err(TransportError::Timeout)
        } else if script.fail_on.as_deref() == Some(name.as_str()) {
            Err(TransportError::other("garbled reply"))
        } else {
            script
                .values
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| TransportError::other("no such property"))
        };
        if let Some((hooked, hook)) = script.on_read.as_ref() {
            if hooked == name.as_str() {
                hook();
            }
        }
        Box::pin(std::future::ready(result))
    }

    fn write<'a>(&'a mut self, name: &'a PropertyName, value: Value) -> TransportFuture<'a, ()> {
        self.script
            .lock()
            .unwrap()
            .writes
            .push((name.to_string(), value));
        Box::pin(std::future::ready(Ok(())))
    }
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) {
        self.lock().values.insert(name.to_string(), value.into());
    }

    pub fn reads(&self) -> Vec<String> {
        self.lock().reads.clone()
    }

    pub fn clear_reads(&self) {
        self.lock().reads.clear();
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.lock().writes.clone()
    }

    pub fn time_out_next(&self, count: u32) {
        self.lock().timeouts = count;
    }

    pub fn time_out_always(&self) {
        self.time_out_next(u32::MAX);
    }

    pub fn time_out_on(&self, name: &str) {
        self.lock().timeout_on = Some(name.to_string());
    }

    pub fn fail_on(&self, name: &str) {
        self.lock().fail_on = Some(name.to_string());
    }

    pub fn on_read(&self, name: &str, hook: impl Fn() + Send + 'static) {
        self.lock().on_read = Some((name.to_string(), Box::new(hook)));
    }
}
