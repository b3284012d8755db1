//! Runtime configuration loading.
//!
//! Values are layered: built-in defaults, then an optional TOML file named
//! by `GG_RESIDENCY_CONFIG`, then `GG_RESIDENCY_*` environment variables.
//! Invalid environment values fall back to the previous layer without
//! crashing. An unreadable or malformed file is an error.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `GG_RESIDENCY_CONFIG` | unset | Path to a TOML config file |
//! | `GG_RESIDENCY_SOCKET_PATH` | platform default | IPC socket path |
//! | `GG_RESIDENCY_IDLE_TIMEOUT` | 0 | Idle offload timeout (secs, 0 = off) |
//! | `GG_RESIDENCY_MONITOR_INTERVAL` | 5 | Idle monitor tick (secs) |
//! | `GG_RESIDENCY_DRAIN_TIMEOUT` | 30 | Max wait for outstanding leases (secs) |
//! | `GG_RESIDENCY_PRELOAD` | true | Load the model at startup |
//! | `GG_RESIDENCY_OFFLOAD_AFTER_USE` | false | Offload after each synthesis |
//! | `GG_RESIDENCY_SHUTDOWN_TIMEOUT` | 10 | Graceful shutdown timeout (secs) |
//! | `GG_RESIDENCY_IPC_FRAME_LIMIT` | 16777216 | Max IPC frame size (bytes) |
//! | `GG_RESIDENCY_MAX_CONNECTIONS` | 64 | Max concurrent IPC connections |
//! | `GG_RESIDENCY_TELEMETRY` | nvidia-smi | Device telemetry backend |
//! | `GG_RESIDENCY_DEVICE_INDEX` | 0 | GPU index for telemetry |
//! | `GG_RESIDENCY_MODEL_NAME` | simulated-tts | Model name |
//! | `GG_RESIDENCY_MODEL_WEIGHTS_MB` | 64 | Simulated weight size (MiB) |
//! | `GG_RESIDENCY_MODEL_LOAD_MS` | 500 | Simulated load delay (ms) |
//! | `GG_RESIDENCY_MODEL_TRANSFER_MS` | 100 | Simulated transfer delay (ms) |
//! | `GG_RESIDENCY_LOG_FORMAT` | json | `json` or `pretty` |
//! | `GG_RESIDENCY_LOG_LEVEL` | info | Filter used when `RUST_LOG` is unset |
//! | `GG_RESIDENCY_LOG_FILE` | unset | Write logs to this file instead of stderr |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::TelemetryBackend;
use crate::ipc::{DEFAULT_MAX_MESSAGE_SIZE, MIN_MESSAGE_SIZE_LIMIT};
use crate::models::SimulatedModelConfig;
use crate::residency::ManagerConfig;
use crate::telemetry::{LogConfig, LogFormat};

/// Default socket path for IPC communication.
#[cfg(unix)]
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/gg-residency/gg-residency.sock";

#[cfg(windows)]
pub const DEFAULT_SOCKET_PATH: &str = r"\\.\pipe\gg-residency";

/// Names the optional TOML config file.
pub const CONFIG_FILE_ENV: &str = "GG_RESIDENCY_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Flat, serializable view of every setting.
///
/// Also the schema of the TOML file: keys are the field names, all optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EffectiveConfig {
    pub socket_path: PathBuf,
    pub idle_timeout_secs: u64,
    pub monitor_interval_secs: u64,
    pub drain_timeout_secs: u64,
    pub preload: bool,
    pub offload_after_use: bool,
    pub shutdown_timeout_secs: u64,
    pub ipc_frame_limit: usize,
    pub max_connections: usize,
    pub telemetry: TelemetryBackend,
    pub device_index: u32,
    pub model_name: String,
    pub model_weights_mb: usize,
    pub model_load_ms: u64,
    pub model_transfer_ms: u64,
    pub log_format: LogFormat,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            idle_timeout_secs: 0,
            monitor_interval_secs: 5,
            drain_timeout_secs: 30,
            preload: true,
            offload_after_use: false,
            shutdown_timeout_secs: 10,
            ipc_frame_limit: DEFAULT_MAX_MESSAGE_SIZE,
            max_connections: 64,
            telemetry: TelemetryBackend::NvidiaSmi,
            device_index: 0,
            model_name: "simulated-tts".to_string(),
            model_weights_mb: 64,
            model_load_ms: 500,
            model_transfer_ms: 100,
            log_format: LogFormat::Json,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// All runtime configuration, typed for the components that consume it.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub socket_path: PathBuf,
    pub manager: ManagerConfig,
    pub monitor_interval: Duration,
    pub preload: bool,
    pub offload_after_use: bool,
    pub shutdown_timeout: Duration,
    pub ipc_frame_limit: usize,
    pub max_connections: usize,
    pub telemetry: TelemetryBackend,
    pub device_index: u32,
    pub model: SimulatedModelConfig,
    pub log: LogConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig::from(EffectiveConfig::default())
    }
}

/// Parse an env var with `FromStr`, returning `current` on missing or invalid.
fn parse_env<T: FromStr>(key: &str, current: T) -> T {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(current),
        Err(_) => current,
    }
}

/// Parse a boolean env var (`1/0`, `true/false`, `yes/no`, `on/off`).
fn parse_bool(key: &str, current: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => current,
        },
        Err(_) => current,
    }
}

/// Read a non-empty string env var.
fn parse_string(key: &str, current: String) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => current,
    }
}

/// Read an optional path env var. An empty value clears it.
fn parse_path(key: &str, current: Option<PathBuf>) -> Option<PathBuf> {
    match std::env::var_os(key) {
        Some(val) if val.is_empty() => None,
        Some(val) => Some(PathBuf::from(val)),
        None => current,
    }
}

fn read_file(path: &Path) -> Result<EffectiveConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env(cfg: EffectiveConfig) -> EffectiveConfig {
    EffectiveConfig {
        socket_path: PathBuf::from(parse_string(
            "GG_RESIDENCY_SOCKET_PATH",
            cfg.socket_path.to_string_lossy().into_owned(),
        )),
        idle_timeout_secs: parse_env("GG_RESIDENCY_IDLE_TIMEOUT", cfg.idle_timeout_secs),
        monitor_interval_secs: parse_env(
            "GG_RESIDENCY_MONITOR_INTERVAL",
            cfg.monitor_interval_secs,
        ),
        drain_timeout_secs: parse_env("GG_RESIDENCY_DRAIN_TIMEOUT", cfg.drain_timeout_secs),
        preload: parse_bool("GG_RESIDENCY_PRELOAD", cfg.preload),
        offload_after_use: parse_bool("GG_RESIDENCY_OFFLOAD_AFTER_USE", cfg.offload_after_use),
        shutdown_timeout_secs: parse_env(
            "GG_RESIDENCY_SHUTDOWN_TIMEOUT",
            cfg.shutdown_timeout_secs,
        ),
        ipc_frame_limit: parse_env("GG_RESIDENCY_IPC_FRAME_LIMIT", cfg.ipc_frame_limit),
        max_connections: parse_env("GG_RESIDENCY_MAX_CONNECTIONS", cfg.max_connections),
        telemetry: parse_env("GG_RESIDENCY_TELEMETRY", cfg.telemetry),
        device_index: parse_env("GG_RESIDENCY_DEVICE_INDEX", cfg.device_index),
        model_name: parse_string("GG_RESIDENCY_MODEL_NAME", cfg.model_name),
        model_weights_mb: parse_env("GG_RESIDENCY_MODEL_WEIGHTS_MB", cfg.model_weights_mb),
        model_load_ms: parse_env("GG_RESIDENCY_MODEL_LOAD_MS", cfg.model_load_ms),
        model_transfer_ms: parse_env("GG_RESIDENCY_MODEL_TRANSFER_MS", cfg.model_transfer_ms),
        log_format: parse_env("GG_RESIDENCY_LOG_FORMAT", cfg.log_format),
        log_level: parse_string("GG_RESIDENCY_LOG_LEVEL", cfg.log_level),
        log_file: parse_path("GG_RESIDENCY_LOG_FILE", cfg.log_file),
    }
}

impl EffectiveConfig {
    /// Apply floors so every value is usable.
    fn clamped(mut self) -> Self {
        self.monitor_interval_secs = self.monitor_interval_secs.max(1);
        self.shutdown_timeout_secs = self.shutdown_timeout_secs.max(1);
        self.ipc_frame_limit = self.ipc_frame_limit.max(MIN_MESSAGE_SIZE_LIMIT);
        self.max_connections = self.max_connections.max(1);
        self
    }

    /// Non-fatal misconfigurations worth reporting.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.idle_timeout_secs > 0 && self.idle_timeout_secs < self.monitor_interval_secs {
            warnings.push(format!(
                "idle timeout ({}s) is shorter than the monitor interval ({}s); offload may lag by up to one interval",
                self.idle_timeout_secs, self.monitor_interval_secs
            ));
        }

        if self.offload_after_use && self.idle_timeout_secs > 0 {
            warnings.push(
                "offload_after_use is set; the idle timeout will rarely trigger".to_string(),
            );
        }

        if !self.preload && self.offload_after_use {
            warnings.push(
                "preload is off and offload_after_use is on; every request pays a transfer"
                    .to_string(),
            );
        }

        warnings
    }
}

impl From<EffectiveConfig> for EnvConfig {
    fn from(cfg: EffectiveConfig) -> Self {
        let cfg = cfg.clamped();
        let idle_timeout = (cfg.idle_timeout_secs > 0)
            .then(|| Duration::from_secs(cfg.idle_timeout_secs));

        EnvConfig {
            socket_path: cfg.socket_path,
            manager: ManagerConfig {
                idle_timeout,
                drain_timeout: Duration::from_secs(cfg.drain_timeout_secs),
            },
            monitor_interval: Duration::from_secs(cfg.monitor_interval_secs),
            preload: cfg.preload,
            offload_after_use: cfg.offload_after_use,
            shutdown_timeout: Duration::from_secs(cfg.shutdown_timeout_secs),
            ipc_frame_limit: cfg.ipc_frame_limit,
            max_connections: cfg.max_connections,
            telemetry: cfg.telemetry,
            device_index: cfg.device_index,
            model: SimulatedModelConfig {
                name: cfg.model_name,
                weights_bytes: cfg.model_weights_mb.saturating_mul(1024 * 1024),
                load_delay: Duration::from_millis(cfg.model_load_ms),
                transfer_delay: Duration::from_millis(cfg.model_transfer_ms),
                ..SimulatedModelConfig::default()
            },
            log: LogConfig {
                format: cfg.log_format,
                level: cfg.log_level,
                output_path: cfg.log_file,
            },
        }
    }
}

/// Resolve all layers into the flat view.
///
/// `file` overrides `GG_RESIDENCY_CONFIG` when given.
pub fn load_effective(file: Option<&Path>) -> Result<EffectiveConfig, ConfigError> {
    let from_env = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
    let base = match file.map(Path::to_path_buf).or(from_env) {
        Some(path) => read_file(&path)?,
        None => EffectiveConfig::default(),
    };
    Ok(apply_env(base).clamped())
}

/// Load all configuration from the file (if any) and environment.
pub fn load() -> Result<EnvConfig, ConfigError> {
    load_effective(None).map(EnvConfig::from)
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            socket_path: self.socket_path.clone(),
            idle_timeout_secs: self.manager.idle_timeout.map_or(0, |t| t.as_secs()),
            monitor_interval_secs: self.monitor_interval.as_secs(),
            drain_timeout_secs: self.manager.drain_timeout.as_secs(),
            preload: self.preload,
            offload_after_use: self.offload_after_use,
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            ipc_frame_limit: self.ipc_frame_limit,
            max_connections: self.max_connections,
            telemetry: self.telemetry,
            device_index: self.device_index,
            model_name: self.model.name.clone(),
            model_weights_mb: self.model.weights_bytes / (1024 * 1024),
            model_load_ms: self.model.load_delay.as_millis() as u64,
            model_transfer_ms: self.model.transfer_delay.as_millis() as u64,
            log_format: self.log.format,
            log_level: self.log.level.clone(),
            log_file: self.log.output_path.clone(),
        }
    }
}
