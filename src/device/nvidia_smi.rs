//! Device memory telemetry via the `nvidia-smi` command line tool.

use std::ffi::OsString;
use std::process::Command;

use crate::residency::{DeviceError, DeviceMemory, DeviceRuntime};

const MIB: u64 = 1024 * 1024;

/// Queries `nvidia-smi` for used/total memory of one GPU.
///
/// Cache clearing is a no-op: the allocator pool belongs to the model
/// library inside this process, not to the driver tool.
#[derive(Debug, Clone)]
pub struct NvidiaSmi {
    binary: OsString,
    device_index: u32,
}

impl NvidiaSmi {
    pub fn new(device_index: u32) -> Self {
        Self::with_binary("nvidia-smi", device_index)
    }

    pub fn with_binary(binary: impl Into<OsString>, device_index: u32) -> Self {
        Self {
            binary: binary.into(),
            device_index,
        }
    }
}

impl DeviceRuntime for NvidiaSmi {
    fn memory_info(&self) -> Result<DeviceMemory, DeviceError> {
        let output = Command::new(&self.binary)
            .args([
                "--query-gpu=memory.used,memory.total",
                "--format=csv,noheader,nounits",
            ])
            .arg(format!("--id={}", self.device_index))
            .output()
            .map_err(|e| DeviceError::TelemetryUnavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeviceError::TelemetryUnavailable(format!(
                "nvidia-smi exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_memory_csv(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `memory.used, memory.total` (MiB, no units) from the first line.
pub fn parse_memory_csv(output: &str) -> Result<DeviceMemory, DeviceError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| DeviceError::MalformedTelemetry("empty output".into()))?;

    let mut fields = line.split(',').map(str::trim);
    let mut next_mib = |what: &str| -> Result<u64, DeviceError> {
        let field = fields
            .next()
            .ok_or_else(|| DeviceError::MalformedTelemetry(format!("missing {}", what)))?;
        field.parse::<u64>().map_err(|_| {
            DeviceError::MalformedTelemetry(format!("invalid {}: {:?}", what, field))
        })
    };

    let used = next_mib("memory.used")?;
    let total = next_mib("memory.total")?;

    Ok(DeviceMemory {
        used_bytes: mib_to_bytes(used, "memory.used")?,
        total_bytes: mib_to_bytes(total, "memory.total")?,
    })
}

fn mib_to_bytes(mib: u64, what: &str) -> Result<u64, DeviceError> {
    mib.checked_mul(MIB)
        .ok_or_else(|| DeviceError::MalformedTelemetry(format!("{} out of range: {} MiB", what, mib)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_gpu() {
        let mem = parse_memory_csv("5120, 24576\n").unwrap();
        assert_eq!(mem.used_bytes, 5120 * MIB);
        assert_eq!(mem.total_bytes, 24576 * MIB);
    }

    #[test]
    fn test_parse_uses_first_nonempty_line() {
        let mem = parse_memory_csv("\n  100, 200\n300, 400\n").unwrap();
        assert_eq!(mem.used_bytes, 100 * MIB);
        assert_eq!(mem.total_bytes, 200 * MIB);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_memory_csv(""),
            Err(DeviceError::MalformedTelemetry(_))
        ));
        assert!(matches!(
            parse_memory_csv("[N/A], 24576"),
            Err(DeviceError::MalformedTelemetry(_))
        ));
        assert!(matches!(
            parse_memory_csv("5120"),
            Err(DeviceError::MalformedTelemetry(_))
        ));
    }

    #[test]
    fn test_parse_rejects_overflowing_values() {
        let huge = format!("{}, 24576", u64::MAX);
        assert!(matches!(
            parse_memory_csv(&huge),
            Err(DeviceError::MalformedTelemetry(_))
        ));
        let huge_total = format!("100, {}", u64::MAX / MIB + 1);
        assert!(matches!(
            parse_memory_csv(&huge_total),
            Err(DeviceError::MalformedTelemetry(_))
        ));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let smi = NvidiaSmi::with_binary("/nonexistent/nvidia-smi-for-tests", 0);
        assert!(matches!(
            smi.memory_info(),
            Err(DeviceError::TelemetryUnavailable(_))
        ));
        assert!(smi.clear_cache().is_ok());
    }
}
