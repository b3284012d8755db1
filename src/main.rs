//! GG-RESIDENCY entry point.
//!
//! Bootstraps the residency runtime with:
//! - Configuration loading (defaults, TOML file, environment)
//! - Structured logging
//! - Model preload, idle monitor, and IPC listener
//! - Signal handling for graceful shutdown
//!
//! ## CLI Subcommands
//!
//! - `gg-residency` or `gg-residency serve` - Run IPC server (default)
//! - `gg-residency status [--json]` - Show residency status
//! - `gg-residency preload|offload|release` - Trigger a transition
//! - `gg-residency idle-timeout <SECS|off>` - Configure idle offload
//! - `gg-residency synthesize --text <TEXT>` - Generate audio
//! - `gg-residency languages|tags [--json]` - List accepted languages and sound tags
//! - `gg-residency config show|defaults|validate` - Inspect configuration

use std::path::PathBuf;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use gg_residency::cli::{self, config_cmd, get_socket_path};
use gg_residency::config as gg_config;
use gg_residency::telemetry::init_logging;
use gg_residency::{Runtime, ShutdownResult};

#[tokio::main]
async fn main() -> ExitCode {
    let (socket_override, args) = split_socket_flag(std::env::args().skip(1).collect());
    let command = args.first().map(|s| s.as_str()).unwrap_or("serve");
    let socket_path = || socket_override.clone().unwrap_or_else(get_socket_path);

    let code = match command {
        "serve" | "" => return run_server(socket_override.clone()).await,
        "status" => {
            let json = args.get(1).map(|s| s.as_str()) == Some("--json");
            cli::run_status(&socket_path(), json).await
        }
        "preload" => cli::run_preload(&socket_path()).await,
        "offload" => cli::run_offload(&socket_path()).await,
        "release" => cli::run_release(&socket_path()).await,
        "idle-timeout" => {
            cli::run_idle_timeout(&socket_path(), args.get(1).map(|s| s.as_str())).await
        }
        "synthesize" => cli::run_synthesize(&socket_path(), &args[1..]).await,
        "languages" => {
            let json = args.get(1).map(|s| s.as_str()) == Some("--json");
            cli::run_languages(&socket_path(), json).await
        }
        "tags" => {
            let json = args.get(1).map(|s| s.as_str()) == Some("--json");
            cli::run_tags(&socket_path(), json).await
        }
        "config" => match args.get(1).map(|s| s.as_str()).unwrap_or("show") {
            "show" => config_cmd::run_show(),
            "defaults" => config_cmd::run_defaults(),
            "validate" => config_cmd::run_validate(),
            other => {
                eprintln!("Unknown config subcommand: {}", other);
                eprintln!("Usage: gg-residency config <show|defaults|validate>");
                cli::EXIT_USAGE
            }
        },
        "help" | "--help" | "-h" => {
            print_usage();
            cli::EXIT_OK
        }
        "version" | "--version" | "-V" => {
            println!("gg-residency {}", env!("CARGO_PKG_VERSION"));
            cli::EXIT_OK
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            cli::EXIT_USAGE
        }
    };
    ExitCode::from(code as u8)
}

/// Remove `--socket PATH` from anywhere in `args`.
fn split_socket_flag(args: Vec<String>) -> (Option<PathBuf>, Vec<String>) {
    let mut socket = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--socket" {
            socket = iter.next().map(PathBuf::from);
        } else if let Some(path) = arg.strip_prefix("--socket=") {
            socket = Some(PathBuf::from(path));
        } else {
            rest.push(arg);
        }
    }
    (socket, rest)
}

async fn run_server(socket_override: Option<PathBuf>) -> ExitCode {
    let mut config = match gg_config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(cli::EXIT_USAGE as u8);
        }
    };
    if let Some(path) = socket_override {
        config.socket_path = path;
    }

    if let Err(e) = init_logging(&config.log) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.model.name,
        idle_timeout_secs = config.manager.idle_timeout.map(|t| t.as_secs()),
        telemetry = config.telemetry.as_str(),
        "starting gg-residency"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("received shutdown signal"),
            Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
        }
        signal.cancel();
    });

    let runtime = Runtime::new(config);
    match runtime.run(shutdown).await {
        Ok(ShutdownResult::Complete) => {
            tracing::info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Ok(ShutdownResult::Timeout { remaining }) => {
            tracing::warn!(remaining, "shutdown timed out with requests in flight");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server error");
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "gg-residency - accelerator residency manager v{}

USAGE:
    gg-residency [--socket PATH] [COMMAND] [OPTIONS]

COMMANDS:
    serve                      Run the IPC server (default when no command given)
    status [--json]            Show residency, GPU memory and idle time
    preload                    Load the model onto the accelerator
    offload                    Move the model to host memory
    release                    Unload the model entirely
    idle-timeout <SECS|off>    Offload automatically after SECS of inactivity
    synthesize --text <TEXT>   Generate audio [--temperature F] [--exaggeration F]
                               [--cfg-weight F] [--language ID] [--output FILE]
    languages [--json]         List language codes accepted by --language
    tags [--json]              List sound tags that may appear in the text
    config <show|defaults|validate>
                               Inspect configuration
    version                    Show version information
    help                       Show this help message

ENVIRONMENT:
    GG_RESIDENCY_CONFIG        Optional TOML config file
    GG_RESIDENCY_SOCKET_PATH   IPC socket path
    GG_RESIDENCY_IDLE_TIMEOUT  Idle offload timeout in seconds (0 = off)
    RUST_LOG                   Log filter (overrides GG_RESIDENCY_LOG_LEVEL)
    See `gg-residency config defaults` for every setting.

EXIT CODES:
    0  Success
    1  Failure reported by the server
    2  Usage or configuration error
    3  Connection error
",
        version
    );
}
