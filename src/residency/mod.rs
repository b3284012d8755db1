// Copyright 2024-2026 GG-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Residency management for the single device-resident model.
//!
//! The [`ResidencyManager`] owns the model instance and moves it between
//! three locations: resident on the accelerator, swapped to host memory, and
//! unloaded. Transitions are serialized through one transition lock; status
//! queries read an atomic snapshot and never wait behind a transition.

pub mod capability;

mod error;
mod lease;
mod manager;
mod monitor;
mod status;

pub use capability::{
    DeviceMemory, DeviceRuntime, ModelError, ModelLoader, NamedLoader, NoDeviceRuntime,
    ResidentModel,
};
pub use error::{DeviceError, ResidencyError};
pub use lease::{FlightGuard, FlightTracker, ModelLease};
pub use manager::{ManagerConfig, ResidencyManager, TELEMETRY_TIMEOUT};
pub use monitor::{spawn_idle_monitor, IdleMonitor, DEFAULT_MONITOR_INTERVAL};
pub use status::StatusReport;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Memory tier a model can be placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// GPU (or other accelerator) memory.
    Accelerator,
    /// Host RAM.
    Host,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Accelerator => write!(f, "accelerator"),
            Device::Host => write!(f, "host"),
        }
    }
}

/// Where the managed model currently lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Residency {
    #[default]
    Unloaded,
    OnDevice,
    OnHost,
}

impl Residency {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Residency::Unloaded => 0,
            Residency::OnDevice => 1,
            Residency::OnHost => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Residency::OnDevice,
            2 => Residency::OnHost,
            _ => Residency::Unloaded,
        }
    }

    /// True when a model instance exists (on either tier).
    pub fn is_loaded(self) -> bool {
        self != Residency::Unloaded
    }
}

impl fmt::Display for Residency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Residency::Unloaded => write!(f, "unloaded"),
            Residency::OnDevice => write!(f, "on_device"),
            Residency::OnHost => write!(f, "on_host"),
        }
    }
}

/// The four kinds of residency transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Cold start via the loader.
    Load,
    /// Host to accelerator.
    Restore,
    /// Accelerator to host.
    Offload,
    /// Drop the instance.
    Release,
}

impl TransitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionKind::Load => "load",
            TransitionKind::Restore => "restore",
            TransitionKind::Offload => "offload",
            TransitionKind::Release => "release",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
