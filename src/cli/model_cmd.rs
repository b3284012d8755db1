// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Residency CLI subcommands: preload, offload, release, idle-timeout.
//!
//! Each connects to a running server via IPC, performs one transition, and
//! prints the resulting status.

use std::path::Path;

use super::{connect, print_status, report_error, EXIT_OK, EXIT_USAGE};

/// Run `preload`. Returns exit code: 0 on success, 1 on failure, 3 on
/// connection failure.
pub async fn run_preload(socket_path: &Path) -> i32 {
    let mut client = match connect(socket_path).await {
        Ok(client) => client,
        Err(code) => return code,
    };
    match client.preload().await {
        Ok(status) => {
            print_status(&status);
            EXIT_OK
        }
        Err(e) => report_error(&e),
    }
}

/// Run `offload`.
pub async fn run_offload(socket_path: &Path) -> i32 {
    let mut client = match connect(socket_path).await {
        Ok(client) => client,
        Err(code) => return code,
    };
    match client.offload().await {
        Ok(status) => {
            print_status(&status);
            EXIT_OK
        }
        Err(e) => report_error(&e),
    }
}

/// Run `release`.
pub async fn run_release(socket_path: &Path) -> i32 {
    let mut client = match connect(socket_path).await {
        Ok(client) => client,
        Err(code) => return code,
    };
    match client.release().await {
        Ok(status) => {
            print_status(&status);
            EXIT_OK
        }
        Err(e) => report_error(&e),
    }
}

/// Run `idle-timeout <SECS|off>`.
pub async fn run_idle_timeout(socket_path: &Path, value: Option<&str>) -> i32 {
    let timeout_secs = match value.map(parse_timeout) {
        Some(Ok(secs)) => secs,
        Some(Err(msg)) => {
            eprintln!("Error: {}", msg);
            return EXIT_USAGE;
        }
        None => {
            eprintln!("Usage: gg-residency idle-timeout <SECONDS|off>");
            return EXIT_USAGE;
        }
    };

    let mut client = match connect(socket_path).await {
        Ok(client) => client,
        Err(code) => return code,
    };
    match client.set_idle_timeout(timeout_secs).await {
        Ok(Some(secs)) => {
            println!("Idle timeout set to {}s", secs);
            EXIT_OK
        }
        Ok(None) => {
            println!("Idle timeout disabled");
            EXIT_OK
        }
        Err(e) => report_error(&e),
    }
}

/// Parse `off`/`none`/`0` as disabled, otherwise whole seconds.
fn parse_timeout(value: &str) -> Result<Option<u64>, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" | "none" | "disable" | "0" => Ok(None),
        other => other
            .parse::<u64>()
            .map(Some)
            .map_err(|_| format!("invalid idle timeout: {}", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("600"), Ok(Some(600)));
        assert_eq!(parse_timeout("off"), Ok(None));
        assert_eq!(parse_timeout("0"), Ok(None));
        assert!(parse_timeout("-5").is_err());
        assert!(parse_timeout("10m").is_err());
    }

    #[tokio::test]
    async fn test_idle_timeout_requires_value() {
        let dir = tempfile::tempdir().unwrap();
        let code = run_idle_timeout(&dir.path().join("x.sock"), None).await;
        assert_eq!(code, EXIT_USAGE);
    }
}
