//! Device runtime adapters.
//!
//! Implementations of [`DeviceRuntime`](crate::residency::DeviceRuntime)
//! selected by configuration.

mod nvidia_smi;

pub use nvidia_smi::{parse_memory_csv, NvidiaSmi};

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::residency::{DeviceRuntime, NoDeviceRuntime};

/// Which telemetry backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TelemetryBackend {
    #[default]
    NvidiaSmi,
    None,
}

impl FromStr for TelemetryBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nvidia-smi" | "nvidia_smi" | "nvidia" => Ok(TelemetryBackend::NvidiaSmi),
            "none" | "off" => Ok(TelemetryBackend::None),
            other => Err(format!("unknown telemetry backend: {}", other)),
        }
    }
}

impl TelemetryBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            TelemetryBackend::NvidiaSmi => "nvidia-smi",
            TelemetryBackend::None => "none",
        }
    }
}

/// Build the device runtime for `backend`.
pub fn device_runtime(backend: TelemetryBackend, device_index: u32) -> Arc<dyn DeviceRuntime> {
    match backend {
        TelemetryBackend::NvidiaSmi => Arc::new(NvidiaSmi::new(device_index)),
        TelemetryBackend::None => Arc::new(NoDeviceRuntime),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("nvidia-smi".parse::<TelemetryBackend>(), Ok(TelemetryBackend::NvidiaSmi));
        assert_eq!("NONE".parse::<TelemetryBackend>(), Ok(TelemetryBackend::None));
        assert!("rocm".parse::<TelemetryBackend>().is_err());
    }

    #[test]
    fn test_none_backend_reports_unavailable() {
        let runtime = device_runtime(TelemetryBackend::None, 0);
        assert!(runtime.memory_info().is_err());
    }
}
