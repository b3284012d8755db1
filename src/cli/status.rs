//! Status CLI subcommand.

use std::path::Path;

use super::{connect, report_error, EXIT_OK};
use crate::residency::StatusReport;

/// Run `status`, connecting via IPC at `socket_path`.
///
/// Returns exit code: 0 on success, 1 on server error, 3 on connection failure.
pub async fn run_status(socket_path: &Path, json: bool) -> i32 {
    let mut client = match connect(socket_path).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    match client.status().await {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{}", text),
                    Err(e) => eprintln!("Error: {}", e),
                }
            } else {
                print_status(&report);
            }
            EXIT_OK
        }
        Err(e) => report_error(&e),
    }
}

/// Print a report as aligned key-value lines.
pub fn print_status(report: &StatusReport) {
    for (key, value) in format_status(report) {
        println!("{:<16} {}", key, value);
    }
}

fn format_status(report: &StatusReport) -> Vec<(&'static str, String)> {
    let mut lines = vec![
        ("Residency", report.residency.to_string()),
        (
            "Model",
            report.model_name.clone().unwrap_or_else(|| "-".to_string()),
        ),
    ];

    let memory = match (
        report.accelerator_memory_used_bytes,
        report.accelerator_memory_total_bytes,
    ) {
        (Some(used), Some(total)) => format!("{} / {} MB", used / MIB, total / MIB),
        _ => "unavailable".to_string(),
    };
    lines.push(("GPU memory", memory));

    lines.push((
        "Idle",
        report
            .idle_seconds
            .map(|s| format!("{:.1}s", s))
            .unwrap_or_else(|| "never used".to_string()),
    ));
    lines.push((
        "Idle timeout",
        report
            .idle_timeout_secs
            .map(|s| format!("{}s", s))
            .unwrap_or_else(|| "disabled".to_string()),
    ));
    lines.push(("In flight", report.in_flight.to_string()));
    lines.push((
        "Last access",
        report
            .last_access_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string()),
    ));
    lines
}

const MIB: u64 = 1024 * 1024;
