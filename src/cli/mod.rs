// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for GG-RESIDENCY runtime commands.
//!
//! Client subcommands talk to a running server over IPC; `config`
//! subcommands read configuration locally.
//!
//! ## Usage
//!
//! ```bash
//! gg-residency status          # Residency, memory and idle time
//! gg-residency offload         # Move the model to host memory
//! gg-residency idle-timeout 600
//! gg-residency languages       # Accepted language codes
//! ```

pub mod catalog_cmd;
pub mod config_cmd;
pub mod model_cmd;
pub mod status;
pub mod synthesize_cmd;

use std::path::PathBuf;

pub use catalog_cmd::{run_languages, run_tags};
pub use model_cmd::{run_idle_timeout, run_offload, run_preload, run_release};
pub use status::{print_status, run_status};
pub use synthesize_cmd::run_synthesize;

use crate::config::{self, DEFAULT_SOCKET_PATH};
use crate::ipc::{ClientError, IpcClient};

/// Exit code: success.
pub const EXIT_OK: i32 = 0;
/// Exit code: the server reported a failure.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code: bad arguments or configuration.
pub const EXIT_USAGE: i32 = 2;
/// Exit code: could not reach the server.
pub const EXIT_CONNECTION: i32 = 3;

/// Resolve the socket path from configuration, falling back to the default.
pub fn get_socket_path() -> PathBuf {
    match config::load_effective(None) {
        Ok(cfg) => cfg.socket_path,
        Err(e) => {
            eprintln!("Warning: {}; using default socket path", e);
            PathBuf::from(DEFAULT_SOCKET_PATH)
        }
    }
}

/// Connect to the server, printing a hint on failure.
pub(crate) async fn connect(socket_path: &std::path::Path) -> Result<IpcClient, i32> {
    match IpcClient::connect(socket_path).await {
        Ok(client) => Ok(client),
        Err(e) => {
            eprintln!("Error connecting to gg-residency server: {}", e);
            eprintln!("Is the server running? Check GG_RESIDENCY_SOCKET_PATH.");
            Err(EXIT_CONNECTION)
        }
    }
}

/// Map a request error to an exit code, printing it.
pub(crate) fn report_error(e: &ClientError) -> i32 {
    eprintln!("Error: {}", e);
    match e {
        ClientError::Connect { .. } | ClientError::Closed | ClientError::Frame(_) => {
            EXIT_CONNECTION
        }
        _ => EXIT_FAILURE,
    }
}
