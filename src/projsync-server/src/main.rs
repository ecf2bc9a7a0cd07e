// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use projsync_app::{init_logging, normalize_name};
use projsync_backend::{register_builtin_backends_on, DeviceAccess, RegistrationContext};
use projsync_core::{
    ChangeListener, CommandRegistry, DynResult, PropertyName, StateSnapshot, SyncError,
};

use projsync_server::config::{DeviceConfig, ServerConfig};
use projsync_server::{shutdown_device_tasks, DeviceHandle, DeviceTask, DeviceTaskConfig};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - projector state sync daemon");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Only start the device with this id
    #[arg(short = 'd', long = "device", value_name = "ID")]
    device: Option<String>,
}

/// Logs every committed change of one device.
struct LoggingListener {
    device_id: String,
}

impl ChangeListener for LoggingListener {
    fn on_change(&self, changed: &BTreeSet<PropertyName>, snapshot: &StateSnapshot) {
        for name in changed {
            match snapshot.get(name.as_str()) {
                Some(value) => info!("[{}] {} = {}", self.device_id, name, value),
                None => info!("[{}] {} cleared", self.device_id, name),
            }
        }
        if let Ok(json) = serde_json::to_string(snapshot) {
            debug!("[{}] State: {}", self.device_id, json);
        }
    }

    fn on_cycle_failed(&self, error: &SyncError) {
        if let SyncError::PollExhausted { attempts, .. } = error {
            warn!(
                "[{}] Device unreachable after {} attempts; keeping last known state",
                self.device_id, attempts
            );
        }
    }
}

fn build_device_task_config(
    device: &DeviceConfig,
    cfg: &ServerConfig,
    registry: Arc<CommandRegistry>,
    backends: Arc<RegistrationContext>,
) -> DynResult<DeviceTaskConfig> {
    let backend = normalize_name(device.backend_name());
    if !backends.is_backend_registered(&backend) {
        return Err(format!(
            "Unknown device backend: {} (available: {})",
            backend,
            backends.registered_backends().join(", ")
        )
        .into());
    }
    let access = device.device_access()?;

    Ok(DeviceTaskConfig {
        id: device.id.clone(),
        backends,
        backend,
        access,
        registry,
        unsupported: device.unsupported.clone(),
        interest: device.interest.clone(),
        active_interval: cfg.behavior.active_interval(),
        idle_interval: cfg.behavior.idle_interval(),
        retry: cfg.behavior.retry_policy(),
    })
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let mut backends = RegistrationContext::new();
    register_builtin_backends_on(&mut backends);
    let backends = Arc::new(backends);

    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let registry = Arc::new(cfg.profile.build_registry()?);
    info!(
        "Command table: {} commands ({} core)",
        registry.len(),
        registry.core_commands().len()
    );

    let mut devices = cfg.resolved_devices();
    if let Some(ref only) = cli.device {
        devices.retain(|d| d.id == *only);
        if devices.is_empty() {
            return Err(format!("No device with id '{}' in configuration", only).into());
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();
    let mut device_handles: HashMap<String, DeviceHandle> = HashMap::new();

    for device in &devices {
        let config = build_device_task_config(
            device,
            &cfg,
            Arc::clone(&registry),
            Arc::clone(&backends),
        )?;
        match &config.access {
            DeviceAccess::Memory { .. } => info!(
                "Starting device {} ({}, backend: {}, in-memory)",
                device.id,
                device.display_name(),
                config.backend
            ),
            DeviceAccess::Tcp { addr, timeout } => info!(
                "Starting device {} ({}, backend: {}, tcp {} timeout {:?})",
                device.id,
                device.display_name(),
                config.backend,
                addr,
                timeout
            ),
        }

        let (task, handle) = DeviceTask::build(config, shutdown_rx.clone())?;
        handle.register_listener(Arc::new(LoggingListener {
            device_id: device.id.clone(),
        }));
        task_handles.push(task.spawn());
        device_handles.insert(device.id.clone(), handle);
    }

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    drop(device_handles);
    shutdown_device_tasks(&shutdown_tx, task_handles).await;
    Ok(())
}
