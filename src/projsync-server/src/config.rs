// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for projsync-server.
//!
//! Config is loaded from the `[projsync-server]` section of `projsync.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./projsync.toml`
//! 3. `~/.config/projsync/projsync.toml`
//! 4. `/etc/projsync/projsync.toml`

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use projsync_app::{ConfigError, ConfigFile};
use projsync_backend::DeviceAccess;
use projsync_core::{CommandRegistry, FixedDelay, PropertyName, SyncResult, Value};

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Polling cadence and retry behavior, shared by all devices
    pub behavior: BehaviorConfig,
    /// Command table shared by all devices
    pub profile: ProfileConfig,
    /// Device instances. When empty a single in-memory device is started.
    #[serde(rename = "devices", default)]
    pub devices: Vec<DeviceConfig>,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Behavior configuration for polling and retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Polling interval in milliseconds while the device is on
    pub active_interval_ms: u64,
    /// Polling interval in milliseconds while the device is off
    pub idle_interval_ms: u64,
    /// Retries of a whole cycle after a device timeout
    pub max_retries: u32,
    /// Delay between cycle retries in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            active_interval_ms: 5_000,
            idle_interval_ms: 10_000,
            max_retries: 12,
            retry_delay_ms: 1_000,
        }
    }
}

impl BehaviorConfig {
    pub fn active_interval(&self) -> Duration {
        Duration::from_millis(self.active_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn retry_policy(&self) -> FixedDelay {
        FixedDelay::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }
}

/// Power property and the values meaning off/standby.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    pub property: String,
    pub off_values: Vec<Value>,
}

/// Signal property and the value meaning "no signal".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub property: String,
    pub no_signal: Value,
}

/// A command only readable while `prerequisite` holds one of `allowed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependentConfig {
    pub name: String,
    pub prerequisite: String,
    /// Compared against values as decoded from the device. Replies that
    /// look numeric or boolean decode as such, so write `1`, not `"1"`.
    pub allowed: Vec<Value>,
}

/// Command table describing what the device can be asked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub power: PowerConfig,
    pub signal: SignalConfig,
    /// Core commands besides power and signal, in polling order
    pub core: Vec<String>,
    pub dependents: Vec<DependentConfig>,
}

fn texts(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::from(*v)).collect()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            power: PowerConfig {
                property: "power".to_string(),
                off_values: texts(&["standby", "cooling", "emergency"]),
            },
            signal: SignalConfig {
                property: "signal".to_string(),
                no_signal: Value::from("no_signal"),
            },
            core: vec!["input".to_string(), "picture_mode".to_string()],
            dependents: vec![
                DependentConfig {
                    name: "brightness".to_string(),
                    prerequisite: "picture_mode".to_string(),
                    allowed: texts(&["manual"]),
                },
                DependentConfig {
                    name: "hdr_processing".to_string(),
                    prerequisite: "picture_mode".to_string(),
                    allowed: texts(&["hdr10", "hlg"]),
                },
                DependentConfig {
                    name: "hdr_level".to_string(),
                    prerequisite: "picture_mode".to_string(),
                    allowed: texts(&["hdr10"]),
                },
                DependentConfig {
                    name: "source_resolution".to_string(),
                    prerequisite: "input".to_string(),
                    allowed: texts(&["hdmi1", "hdmi2"]),
                },
            ],
        }
    }
}

impl ProfileConfig {
    /// Build and validate the command registry described by this profile.
    pub fn build_registry(&self) -> SyncResult<CommandRegistry> {
        let mut builder = CommandRegistry::builder()
            .power(self.power.property.as_str(), self.power.off_values.iter().cloned())
            .signal(self.signal.property.as_str(), self.signal.no_signal.clone());
        for name in &self.core {
            builder = builder.command(name.as_str());
        }
        for dep in &self.dependents {
            builder = builder.dependent(
                dep.name.as_str(),
                dep.prerequisite.as_str(),
                dep.allowed.iter().cloned(),
            );
        }
        builder.build()
    }

    /// Reject values that can never equal a decoded device reply,
    /// such as the text `"1"` (devices answering `1` decode to an integer).
    fn validate_values(&self) -> Result<(), String> {
        let values = self
            .power
            .off_values
            .iter()
            .map(|v| ("power.off_values", v))
            .chain([("signal.no_signal", &self.signal.no_signal)])
            .chain(
                self.dependents
                    .iter()
                    .flat_map(|d| d.allowed.iter().map(|v| ("dependents.allowed", v))),
            );
        for (field, value) in values {
            let decoded = Value::parse(&value.to_string());
            if decoded != *value {
                return Err(format!(
                    "[profile].{}: \"{}\" never matches a device reply (decoded as {:?})",
                    field, value, decoded
                ));
            }
        }
        Ok(())
    }
}

/// Per-device instance configuration.
///
/// Each entry in `[[devices]]` becomes one of these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Stable device identifier used in logs.
    pub id: String,
    /// Display name; defaults to the id.
    pub name: Option<String>,
    /// Backend name ("dummy", "tcp"); derived from the access type when unset.
    pub backend: Option<String>,
    pub access: AccessConfig,
    /// Commands this device does not implement.
    pub unsupported: Vec<String>,
    /// Dependent commands polled for the lifetime of the server.
    pub interest: Vec<String>,
    /// Starting values for the in-memory backend.
    pub initial: BTreeMap<String, Value>,
}

impl DeviceConfig {
    /// Get the display name for this device.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn backend_name(&self) -> &str {
        match (&self.backend, self.access.access_type.as_deref()) {
            (Some(backend), _) => backend.as_str(),
            (None, Some("tcp")) => "tcp",
            _ => "dummy",
        }
    }

    /// Translate the access section into backend connection details.
    pub fn device_access(&self) -> Result<DeviceAccess, String> {
        match self.access.access_type.as_deref().unwrap_or("memory") {
            "memory" => Ok(DeviceAccess::Memory {
                initial: self
                    .initial
                    .iter()
                    .map(|(k, v)| (PropertyName::from(k.as_str()), v.clone()))
                    .collect(),
            }),
            "tcp" => {
                let host = self.access.host.as_deref().unwrap_or("").trim();
                let port = self.access.port.unwrap_or(0);
                if host.is_empty() || port == 0 {
                    return Err(format!(
                        "[[devices]] '{}': tcp access requires host and port",
                        self.id
                    ));
                }
                Ok(DeviceAccess::Tcp {
                    addr: format!("{}:{}", host, port),
                    timeout: Duration::from_millis(self.access.timeout_ms),
                })
            }
            other => Err(format!(
                "[[devices]] '{}': access type '{}' is invalid (expected 'memory' or 'tcp')",
                self.id, other
            )),
        }
    }
}

/// Access method configuration for reaching a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Access type: "memory" or "tcp"
    #[serde(rename = "type")]
    pub access_type: Option<String>,
    /// Host address (for TCP access)
    pub host: Option<String>,
    /// TCP port (for TCP access)
    pub port: Option<u16>,
    /// Per-exchange timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            access_type: None,
            host: None,
            port: None,
            timeout_ms: 2_000,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.behavior.active_interval_ms == 0 {
            return Err("[behavior].active_interval_ms must be > 0".to_string());
        }
        if self.behavior.idle_interval_ms == 0 {
            return Err("[behavior].idle_interval_ms must be > 0".to_string());
        }

        let registry = self
            .profile
            .build_registry()
            .map_err(|e| format!("[profile]: {}", e))?;
        self.profile.validate_values()?;

        let mut seen_ids = HashSet::new();
        for device in self.resolved_devices() {
            if !seen_ids.insert(device.id.clone()) {
                return Err(format!("[[devices]] id '{}' is used twice", device.id));
            }
            device.device_access()?;
            if device.access.timeout_ms == 0 {
                return Err(format!(
                    "[[devices]] '{}': access.timeout_ms must be > 0",
                    device.id
                ));
            }
            for name in device.unsupported.iter().chain(&device.interest) {
                if !registry.contains(name) {
                    return Err(format!(
                        "[[devices]] '{}': unknown command '{}'",
                        device.id, name
                    ));
                }
            }
            if device.unsupported.iter().any(|name| {
                *name == self.profile.power.property || *name == self.profile.signal.property
            }) {
                return Err(format!(
                    "[[devices]] '{}': power and signal cannot be unsupported",
                    device.id
                ));
            }
        }
        Ok(())
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    /// Load configuration from the default search paths.
    /// Returns default config if no config file is found.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Return the effective list of devices to start.
    ///
    /// Devices without an id get `<backend>_<index>`. With no `[[devices]]`
    /// at all a single in-memory device with id `default` is synthesised.
    pub fn resolved_devices(&self) -> Vec<DeviceConfig> {
        if self.devices.is_empty() {
            return vec![DeviceConfig {
                id: "default".to_string(),
                ..DeviceConfig::default()
            }];
        }
        self.devices
            .iter()
            .enumerate()
            .map(|(idx, device)| {
                let id = if device.id.trim().is_empty() {
                    format!("{}_{}", device.backend_name(), idx)
                } else {
                    device.id.clone()
                };
                DeviceConfig {
                    id,
                    ..device.clone()
                }
            })
            .collect()
    }

    /// Generate an example configuration wrapped under the
    /// `[projsync-server]` section header.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "projsync-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            behavior: BehaviorConfig::default(),
            profile: ProfileConfig::default(),
            devices: vec![
                DeviceConfig {
                    id: "living_room".to_string(),
                    name: Some("Living room projector".to_string()),
                    backend: Some("tcp".to_string()),
                    access: AccessConfig {
                        access_type: Some("tcp".to_string()),
                        host: Some("192.168.1.50".to_string()),
                        port: Some(20554),
                        timeout_ms: 2_000,
                    },
                    unsupported: vec!["hdr_level".to_string()],
                    interest: vec!["brightness".to_string()],
                    initial: BTreeMap::new(),
                },
                DeviceConfig {
                    id: "bench".to_string(),
                    name: None,
                    backend: Some("dummy".to_string()),
                    access: AccessConfig {
                        access_type: Some("memory".to_string()),
                        ..AccessConfig::default()
                    },
                    unsupported: Vec::new(),
                    interest: vec!["hdr_processing".to_string()],
                    initial: [("picture_mode".to_string(), Value::from("hdr10"))]
                        .into_iter()
                        .collect(),
                },
            ],
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected trace|debug|info|warn|error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "projsync-server"
    }
}
