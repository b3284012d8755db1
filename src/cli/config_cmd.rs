// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from the config file and
//! environment without requiring an IPC connection to a running server.

use super::{EXIT_FAILURE, EXIT_OK, EXIT_USAGE};
use crate::config::{self, EffectiveConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() -> i32 {
    match config::load() {
        Ok(env) => {
            print_config(&env.effective_config());
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_USAGE
        }
    }
}

/// Print default config values (no file or env overrides) to stdout.
pub fn run_defaults() -> i32 {
    print_config(&EffectiveConfig::default());
    EXIT_OK
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if the config file
/// cannot be loaded.
pub fn run_validate() -> i32 {
    let cfg = match config::load_effective(None) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return EXIT_USAGE;
        }
    };

    let warnings = cfg.warnings();
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }

    if warnings.is_empty() {
        println!("Configuration is valid.");
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

fn config_lines(cfg: &EffectiveConfig) -> Vec<String> {
    vec![
        format!("GG_RESIDENCY_SOCKET_PATH={}", cfg.socket_path.display()),
        format!("GG_RESIDENCY_IDLE_TIMEOUT={}", cfg.idle_timeout_secs),
        format!("GG_RESIDENCY_MONITOR_INTERVAL={}", cfg.monitor_interval_secs),
        format!("GG_RESIDENCY_DRAIN_TIMEOUT={}", cfg.drain_timeout_secs),
        format!("GG_RESIDENCY_PRELOAD={}", cfg.preload),
        format!("GG_RESIDENCY_OFFLOAD_AFTER_USE={}", cfg.offload_after_use),
        format!("GG_RESIDENCY_SHUTDOWN_TIMEOUT={}", cfg.shutdown_timeout_secs),
        format!("GG_RESIDENCY_IPC_FRAME_LIMIT={}", cfg.ipc_frame_limit),
        format!("GG_RESIDENCY_MAX_CONNECTIONS={}", cfg.max_connections),
        format!("GG_RESIDENCY_TELEMETRY={}", cfg.telemetry.as_str()),
        format!("GG_RESIDENCY_DEVICE_INDEX={}", cfg.device_index),
        format!("GG_RESIDENCY_MODEL_NAME={}", cfg.model_name),
        format!("GG_RESIDENCY_MODEL_WEIGHTS_MB={}", cfg.model_weights_mb),
        format!("GG_RESIDENCY_MODEL_LOAD_MS={}", cfg.model_load_ms),
        format!("GG_RESIDENCY_MODEL_TRANSFER_MS={}", cfg.model_transfer_ms),
        format!("GG_RESIDENCY_LOG_FORMAT={}", log_format_name(cfg)),
        format!("GG_RESIDENCY_LOG_LEVEL={}", cfg.log_level),
        format!(
            "GG_RESIDENCY_LOG_FILE={}",
            cfg.log_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        ),
    ]
}

fn log_format_name(cfg: &EffectiveConfig) -> &'static str {
    match cfg.log_format {
        crate::telemetry::LogFormat::Json => "json",
        crate::telemetry::LogFormat::Pretty => "pretty",
    }
}

fn print_config(cfg: &EffectiveConfig) {
    for line in config_lines(cfg) {
        println!("{}", line);
    }
}
