// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod config;
pub mod device_handle;
pub mod device_task;

pub use config::ServerConfig;
pub use device_handle::DeviceHandle;
pub use device_task::{run_device_task, shutdown_device_tasks, DeviceTask, DeviceTaskConfig};
