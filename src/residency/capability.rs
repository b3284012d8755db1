// Copyright 2024-2026 GG-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Capabilities the manager consumes from the model library and the device
//! runtime.
//!
//! The manager never inspects a model. It constructs one through a
//! [`ModelLoader`], moves it with [`ResidentModel::migrate`], and asks a
//! [`DeviceRuntime`] for memory figures and cache-clear hints. Models that
//! must move several sub-components keep that detail inside `migrate`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::DeviceError;
use super::Device;

/// Errors raised by model capabilities (load, migrate, generate).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{0}")]
    Backend(String),

    #[error("Model is on {actual}, expected {expected}")]
    NotResident { expected: Device, actual: Device },

    #[error("Model task panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ModelError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// A model instance whose state can move between memory tiers.
///
/// `migrate` consumes the instance: on success the returned value lives on
/// `target`; on failure the instance is gone and the manager records the
/// model as unloaded.
pub trait ResidentModel: Sized + Send + Sync + 'static {
    fn migrate(self, target: Device) -> Result<Self, ModelError>;
}

/// Constructs a fresh model instance directly on the accelerator.
pub trait ModelLoader<M>: Send + Sync {
    fn load(&self) -> Result<M, ModelError>;

    /// Name used in logs and status reports.
    fn model_name(&self) -> &str {
        "model"
    }
}

/// Adapts a closure into a named [`ModelLoader`].
pub struct NamedLoader<F> {
    name: String,
    load: F,
}

impl<F> NamedLoader<F> {
    pub fn new(name: impl Into<String>, load: F) -> Self {
        Self { name: name.into(), load }
    }
}

impl<M, F> ModelLoader<M> for NamedLoader<F>
where
    F: Fn() -> Result<M, ModelError> + Send + Sync,
{
    fn load(&self) -> Result<M, ModelError> {
        (self.load)()
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Accelerator memory figures in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMemory {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl DeviceMemory {
    /// Fraction of device memory in use, in `[0.0, 1.0]`.
    pub fn utilization(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// Device-level capabilities: telemetry and allocator hints.
///
/// Both calls are best-effort. The manager never fails an operation because
/// of them.
pub trait DeviceRuntime: Send + Sync {
    fn memory_info(&self) -> Result<DeviceMemory, DeviceError>;

    /// Return freed memory to the device allocator pool.
    fn clear_cache(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Runtime used when no device telemetry is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeviceRuntime;

impl DeviceRuntime for NoDeviceRuntime {
    fn memory_info(&self) -> Result<DeviceMemory, DeviceError> {
        Err(DeviceError::TelemetryUnavailable(
            "no device runtime configured".into(),
        ))
    }
}
