//! Background idle monitor.
//!
//! Wakes on a fixed interval and offloads the model once it has been idle
//! for the configured timeout. The timeout is read on every tick, so it can
//! be changed or disabled at runtime without restarting the monitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::capability::ResidentModel;
use super::manager::ResidencyManager;

/// Default wake-up interval.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn the idle monitor loop.
pub fn spawn_idle_monitor<M: ResidentModel>(
    manager: Arc<ResidencyManager<M>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        monitor_loop(&manager, interval, shutdown).await;
    })
}

async fn monitor_loop<M: ResidentModel>(
    manager: &ResidencyManager<M>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_ms = interval.as_millis() as u64, "idle monitor started");

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::info!("idle monitor: shutdown signal received");
                break;
            }
            _ = ticker.tick() => {}
        }

        let Some(timeout) = manager.idle_timeout() else {
            continue;
        };

        // Runs to completion even if shutdown fires meanwhile.
        match manager.offload_if_idle(timeout).await {
            Ok(true) => tracing::info!(
                idle_timeout_secs = timeout.as_secs(),
                "idle timeout reached, model offloaded to host"
            ),
            Ok(false) => {}
            Err(e) if e.is_warning() => tracing::debug!(error = %e, "idle offload skipped"),
            Err(e) => tracing::warn!(error = %e, "idle offload failed"),
        }
    }
}

/// Owned handle to a running monitor.
pub struct IdleMonitor {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl IdleMonitor {
    pub fn spawn<M: ResidentModel>(manager: Arc<ResidencyManager<M>>, interval: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let handle = spawn_idle_monitor(manager, interval, shutdown.clone());
        Self { shutdown, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "idle monitor task ended abnormally");
        }
    }
}
