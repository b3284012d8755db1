//! Residency error types.
//!
//! Load and migration failures always leave the manager `Unloaded` before
//! they reach the caller. Device errors are advisory only.

use thiserror::Error;

use super::capability::ModelError;
use super::Device;

/// Errors returned by residency transitions.
#[derive(Debug, Error)]
pub enum ResidencyError {
    #[error("No loader available: nothing has been loaded and no loader was supplied")]
    NoLoaderAvailable,

    #[error("Loading {model} failed: {source}")]
    Load {
        model: String,
        #[source]
        source: ModelError,
    },

    #[error("Migrating {model} to {target} failed: {source}")]
    Migration {
        model: String,
        target: Device,
        #[source]
        source: ModelError,
    },

    #[error("Drain timed out with {in_flight} lease(s) outstanding")]
    DrainTimeout { in_flight: u32 },
}

impl ResidencyError {
    /// Returns true if the model was lost as a result of this error.
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Migration { .. })
    }

    /// Returns true if this error should be logged as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::DrainTimeout { .. } | Self::NoLoaderAvailable)
    }
}

/// Errors from device telemetry and allocator hints.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    #[error("Malformed telemetry output: {0}")]
    MalformedTelemetry(String),

    #[error("Cache clear failed: {0}")]
    CacheClear(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
