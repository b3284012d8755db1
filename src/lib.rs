//! GG-RESIDENCY Runtime
//!
//! Keeps a single text-to-speech model resident on the accelerator while it
//! is in use, swaps it to host memory when idle, and unloads it on request.
//!
//! # Layout
//!
//! - [`residency`]: the manager, leases, and idle monitor
//! - [`device`]: accelerator memory telemetry
//! - [`synthesis`] / [`models`]: the model capability and the simulated model
//! - [`ipc`]: local-socket control plane (no HTTP/REST/WebSocket)
//! - [`config`], [`telemetry`], [`cli`]: ambient concerns

pub mod cli;
pub mod config;
pub mod device;
pub mod ipc;
pub mod models;
pub mod residency;
pub mod synthesis;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use config::EnvConfig;
use ipc::{IpcHandler, IpcHandlerConfig, IpcServerConfig, ServerError};
use models::{SimulatedLoader, SimulatedVoice};
use residency::{DeviceRuntime, IdleMonitor, ModelLoader, ResidencyManager};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("IPC server failed: {0}")]
    Server(#[from] ServerError),

    #[error("IPC server task failed: {0}")]
    Task(String),
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    /// Leases were still held when the shutdown timeout expired.
    Timeout { remaining: u32 },
}

/// The GG-RESIDENCY runtime instance.
pub struct Runtime {
    config: EnvConfig,
    manager: Arc<ResidencyManager<SimulatedVoice>>,
    loader: Arc<dyn ModelLoader<SimulatedVoice>>,
    handler: Arc<IpcHandler<SimulatedVoice>>,
}

impl Runtime {
    /// Create a runtime using the configured telemetry backend.
    pub fn new(config: EnvConfig) -> Self {
        let device = device::device_runtime(config.telemetry, config.device_index);
        Self::with_device(config, device)
    }

    /// Create a runtime with an explicit device runtime.
    pub fn with_device(config: EnvConfig, device: Arc<dyn DeviceRuntime>) -> Self {
        let manager = Arc::new(ResidencyManager::new(device, config.manager.clone()));
        let loader: Arc<dyn ModelLoader<SimulatedVoice>> =
            Arc::new(SimulatedLoader::new(config.model.clone()));
        let handler = Arc::new(IpcHandler::new(
            manager.clone(),
            loader.clone(),
            IpcHandlerConfig {
                offload_after_use: config.offload_after_use,
                max_message_size: config.ipc_frame_limit,
            },
        ));

        Self {
            config,
            manager,
            loader,
            handler,
        }
    }

    pub fn manager(&self) -> &Arc<ResidencyManager<SimulatedVoice>> {
        &self.manager
    }

    pub fn handler(&self) -> &Arc<IpcHandler<SimulatedVoice>> {
        &self.handler
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Preload (if configured), start the idle monitor, and serve IPC until
    /// `shutdown` is cancelled. Then stop the monitor and release the model,
    /// waiting at most the shutdown timeout for in-progress requests.
    pub async fn run(self, shutdown: CancellationToken) -> Result<ShutdownResult, RuntimeError> {
        if self.config.preload {
            if let Err(e) = self.manager.preload(self.loader.clone()).await {
                tracing::warn!(error = %e, "preload failed; the model will load on first use");
            }
        }

        let monitor = IdleMonitor::spawn(self.manager.clone(), self.config.monitor_interval);
        let server_config = IpcServerConfig {
            socket_path: self.config.socket_path.clone(),
            max_connections: self.config.max_connections,
            max_frame_size: self.config.ipc_frame_limit,
        };
        let mut server = tokio::spawn(ipc::serve(
            server_config,
            self.handler.clone(),
            shutdown.clone(),
        ));

        let early_exit = tokio::select! {
            joined = &mut server => Some(joined),
            () = shutdown.cancelled() => None,
        };
        if let Some(joined) = early_exit {
            monitor.stop().await;
            self.manager.release().await;
            return match joined {
                Ok(Ok(())) => Ok(ShutdownResult::Complete),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(RuntimeError::Task(e.to_string())),
            };
        }

        tracing::info!(
            timeout_secs = self.config.shutdown_timeout.as_secs(),
            "shutdown requested, draining requests"
        );
        let drained = tokio::time::timeout(self.config.shutdown_timeout, &mut server).await;
        monitor.stop().await;

        let result = match drained {
            Ok(_) => ShutdownResult::Complete,
            Err(_) => {
                server.abort();
                ShutdownResult::Timeout {
                    remaining: self.manager.in_flight(),
                }
            }
        };

        self.release_bounded(Duration::from_secs(1)).await;
        Ok(result)
    }

    async fn release_bounded(&self, timeout: Duration) {
        if tokio::time::timeout(timeout, self.manager.release())
            .await
            .is_err()
        {
            tracing::warn!("model release did not finish before exit");
        }
    }
}
