// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use projsync_app::normalize_name;
use projsync_core::{CommandRegistry, DynResult, PropertyName, Transport, Value};

mod dummy;
#[cfg(feature = "tcp")]
mod tcp;

pub use dummy::DummyProjector;
#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;

/// Connection details for instantiating a device backend.
#[derive(Debug, Clone)]
pub enum DeviceAccess {
    /// Simulated device living in process memory.
    Memory {
        initial: BTreeMap<PropertyName, Value>,
    },
    /// Line protocol over TCP; each exchange is bounded by `timeout`.
    Tcp { addr: String, timeout: Duration },
}

pub type BackendFactory = fn(DeviceAccess, &CommandRegistry) -> DynResult<Box<dyn Transport>>;

/// Context for registering and instantiating device backends.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, BackendFactory>,
}

impl RegistrationContext {
    /// Create a new empty registration context.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory under a stable name (e.g. "tcp").
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) {
        let key = normalize_name(name);
        self.factories.insert(key, factory);
    }

    /// Check whether a backend name is registered.
    pub fn is_backend_registered(&self, name: &str) -> bool {
        let key = normalize_name(name);
        self.factories.contains_key(&key)
    }

    /// List registered backend names.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate a transport based on the selected name and access method.
    pub fn build_transport(
        &self,
        name: &str,
        access: DeviceAccess,
        registry: &CommandRegistry,
    ) -> DynResult<Box<dyn Transport>> {
        let key = normalize_name(name);
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| format!("Unknown device backend: {}", name))?;
        factory(access, registry)
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Register all built-in backends enabled by features on a context.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("dummy", dummy_factory);
    #[cfg(feature = "tcp")]
    context.register_backend("tcp", tcp_factory);
}

fn dummy_factory(
    access: DeviceAccess,
    registry: &CommandRegistry,
) -> DynResult<Box<dyn Transport>> {
    match access {
        DeviceAccess::Memory { initial } => Ok(Box::new(DummyProjector::new(registry, initial))),
        DeviceAccess::Tcp { .. } => Err("dummy backend only supports memory access".into()),
    }
}

#[cfg(feature = "tcp")]
fn tcp_factory(access: DeviceAccess, _registry: &CommandRegistry) -> DynResult<Box<dyn Transport>> {
    match access {
        DeviceAccess::Tcp { addr, timeout } => Ok(Box::new(TcpTransport::new(addr, timeout))),
        DeviceAccess::Memory { .. } => Err("tcp backend requires an address".into()),
    }
}
