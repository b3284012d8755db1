// Copyright 2024-2026 GG-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! The residency manager.
//!
//! Owns the single model instance and moves it between the accelerator, host
//! memory and nowhere. All transitions serialize through one async mutex
//! that guards the model slot; slow capability calls run on the blocking
//! pool while the lock is held. The on-device fast path and `status()` never
//! touch that mutex.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

use super::capability::{DeviceRuntime, ModelError, ModelLoader, ResidentModel};
use super::error::{DeviceError, ResidencyError};
use super::lease::{FlightTracker, ModelLease};
use super::status::{StateCell, StatusReport};
use super::{Device, Residency, TransitionKind};
use crate::telemetry::{self, LeasePath, SpanExt, TransitionSpan};

/// Poll interval while draining leases.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Upper bound on one device telemetry query made by `status()`.
pub const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(2);

/// Manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Offload after this much inactivity. `None` disables auto-offload.
    pub idle_timeout: Option<Duration>,
    /// Upper bound on waiting for outstanding leases before offload/release.
    pub drain_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// The model together with where it lives. Holding the model in the
/// variant makes "instance present iff loaded" structural.
enum Slot<M> {
    Unloaded,
    OnDevice(Arc<M>),
    OnHost(M),
}

/// Marks a transition in progress. Unless committed, dropping it records
/// `Unloaded`: a transition abandoned mid-flight has already taken the
/// model out of the slot.
struct Transition<'a> {
    state: &'a StateCell,
    committed: bool,
}

impl<'a> Transition<'a> {
    fn begin(state: &'a StateCell) -> Self {
        Self { state, committed: false }
    }

    fn commit(mut self, residency: Residency) {
        self.state.set_residency(residency);
        telemetry::record_residency(residency);
        self.committed = true;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.state.set_residency(Residency::Unloaded);
            telemetry::record_residency(Residency::Unloaded);
        }
    }
}

/// Process-wide owner of the single device-resident model.
///
/// Construct once and share through `Arc`.
pub struct ResidencyManager<M: ResidentModel> {
    /// The transition lock.
    slot: tokio::sync::Mutex<Slot<M>>,
    /// Clone of the on-device model for lock-free leasing. Populated only
    /// while the slot is `OnDevice`.
    resident: RwLock<Option<Arc<M>>>,
    loader: Mutex<Option<Arc<dyn ModelLoader<M>>>>,
    /// Instance that `release` gave up on while leases still held it. No
    /// new instance is loaded until it is gone.
    orphan: Mutex<Option<Weak<M>>>,
    state: Arc<StateCell>,
    flights: Arc<FlightTracker>,
    device: Arc<dyn DeviceRuntime>,
    config: ManagerConfig,
    telemetry_timeout: Duration,
}

impl<M: ResidentModel> ResidencyManager<M> {
    pub fn new(device: Arc<dyn DeviceRuntime>, config: ManagerConfig) -> Self {
        Self {
            slot: tokio::sync::Mutex::new(Slot::Unloaded),
            resident: RwLock::new(None),
            loader: Mutex::new(None),
            orphan: Mutex::new(None),
            state: Arc::new(StateCell::new(config.idle_timeout)),
            flights: Arc::new(FlightTracker::new()),
            device,
            config,
            telemetry_timeout: TELEMETRY_TIMEOUT,
        }
    }

    /// Bound each device telemetry query made by `status()`.
    pub fn with_telemetry_timeout(mut self, timeout: Duration) -> Self {
        self.telemetry_timeout = timeout;
        self
    }

    /// Load the model onto the accelerator at startup.
    ///
    /// Records `loader` in every case. If an instance already exists (on
    /// either tier) nothing else happens.
    pub async fn preload(&self, loader: Arc<dyn ModelLoader<M>>) -> Result<(), ResidencyError> {
        let mut slot = self.slot.lock().await;
        self.record_loader(loader.clone());

        if !matches!(*slot, Slot::Unloaded) {
            debug!(model = loader.model_name(), "preload skipped, model already present");
            return Ok(());
        }

        self.await_orphan().await?;
        let transition = Transition::begin(&self.state);
        let model = self.cold_start(loader).await?;
        self.install_on_device(&mut slot, model);
        self.state.touch();
        transition.commit(Residency::OnDevice);
        Ok(())
    }

    /// Return a lease on the model, resident on the accelerator.
    ///
    /// A supplied `loader` replaces the recorded one. From `OnHost` the
    /// model is migrated back; from `Unloaded` it is cold-started. On load
    /// or migration failure the manager ends `Unloaded`.
    pub async fn acquire(
        &self,
        loader: Option<Arc<dyn ModelLoader<M>>>,
    ) -> Result<ModelLease<M>, ResidencyError> {
        if let Some(loader) = loader {
            self.record_loader(loader);
        }

        if let Some(lease) = self.lease_resident() {
            telemetry::record_lease(LeasePath::Fast);
            return Ok(lease);
        }

        let mut slot = self.slot.lock().await;
        let model = match std::mem::replace(&mut *slot, Slot::Unloaded) {
            // Another caller finished the transition while we waited.
            Slot::OnDevice(model) => {
                let lease = self.lease(model.clone());
                *slot = Slot::OnDevice(model);
                telemetry::record_lease(LeasePath::Locked);
                return Ok(lease);
            }
            Slot::OnHost(model) => {
                let transition = Transition::begin(&self.state);
                let model = self
                    .migrate(model, TransitionKind::Restore, Device::Accelerator)
                    .await
                    .inspect_err(|_| self.clear_device_cache())?;
                let model = self.install_on_device(&mut slot, model);
                transition.commit(Residency::OnDevice);
                model
            }
            Slot::Unloaded => {
                let loader = self
                    .recorded_loader()
                    .ok_or(ResidencyError::NoLoaderAvailable)?;
                self.await_orphan().await?;
                let transition = Transition::begin(&self.state);
                let model = self.cold_start(loader).await?;
                let model = self.install_on_device(&mut slot, model);
                transition.commit(Residency::OnDevice);
                model
            }
        };

        telemetry::record_lease(LeasePath::Locked);
        Ok(self.lease(model))
    }

    /// Move the model from the accelerator to host memory.
    ///
    /// No-op unless `OnDevice`. Waits up to the drain timeout for
    /// outstanding leases; on timeout the model stays on the device.
    pub async fn offload(&self) -> Result<(), ResidencyError> {
        let mut slot = self.slot.lock().await;
        self.offload_locked(&mut slot, self.config.drain_timeout).await
    }

    /// Offload only if the model is on the device, unleased, and has been
    /// idle for at least `timeout`. Returns whether an offload happened.
    ///
    /// The check runs under the transition lock with fast-path leasing
    /// blocked, so an `acquire` that slipped in first always wins.
    pub async fn offload_if_idle(&self, timeout: Duration) -> Result<bool, ResidencyError> {
        let mut slot = self.slot.lock().await;
        if !matches!(*slot, Slot::OnDevice(_)) {
            return Ok(false);
        }

        let cached = self.resident.write().take();
        if self.flights.in_flight() > 0 || !self.state.idle_for(timeout) {
            *self.resident.write() = cached;
            return Ok(false);
        }
        drop(cached);

        self.offload_locked(&mut slot, Duration::ZERO).await?;
        Ok(true)
    }

    /// Drop the model regardless of where it lives. The loader is kept.
    ///
    /// Leases still held at the drain deadline keep the instance alive;
    /// the next cold start waits for them.
    pub async fn release(&self) {
        let mut slot = self.slot.lock().await;
        let previous = std::mem::replace(&mut *slot, Slot::Unloaded);
        if matches!(previous, Slot::Unloaded) {
            return;
        }

        let span = TransitionSpan::new(TransitionKind::Release, &self.model_name_or_default());
        let started = Instant::now();
        let transition = Transition::begin(&self.state);
        drop(self.resident.write().take());

        async {
            match previous {
                Slot::OnDevice(model) => {
                    if let Err(model) = self.drain(model, self.config.drain_timeout).await {
                        warn!(
                            in_flight = self.flights.in_flight(),
                            "releasing with outstanding leases; device memory is reclaimed when they complete"
                        );
                        *self.orphan.lock() = Some(Arc::downgrade(&model));
                        drop(model);
                    }
                }
                Slot::OnHost(model) => drop(model),
                Slot::Unloaded => {}
            }
            info!("model released");
        }
        .instrument(span.clone())
        .await;

        transition.commit(Residency::Unloaded);
        self.clear_device_cache();
        span.record("status", "ok");
        span.record_elapsed(started.elapsed());
        telemetry::record_transition(TransitionKind::Release, true, started.elapsed());
    }

    /// Snapshot of the manager. Never waits on the transition lock.
    pub async fn status(&self) -> StatusReport {
        let memory = self.query_memory().await;
        StatusReport {
            residency: self.state.residency(),
            model_name: self.model_name(),
            accelerator_memory_used_bytes: memory.map(|m| m.used_bytes),
            accelerator_memory_total_bytes: memory.map(|m| m.total_bytes),
            idle_seconds: self.state.idle_duration().map(|d| d.as_secs_f64()),
            idle_timeout_secs: self.state.idle_timeout().map(|d| d.as_secs()),
            in_flight: self.flights.in_flight(),
            last_access_at: self.state.last_access_at(),
        }
    }

    /// Set or clear the idle timeout. A zero duration disables it.
    pub fn configure_idle_timeout(&self, timeout: Option<Duration>) {
        self.state.set_idle_timeout(timeout);
        match self.state.idle_timeout() {
            Some(t) => info!(idle_timeout_secs = t.as_secs(), "idle timeout configured"),
            None => info!("idle timeout disabled"),
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.state.idle_timeout()
    }

    pub fn residency(&self) -> Residency {
        self.state.residency()
    }

    /// Number of leases currently held by callers.
    pub fn in_flight(&self) -> u32 {
        self.flights.in_flight()
    }

    /// Name of the recorded loader's model, if any loader was recorded.
    pub fn model_name(&self) -> Option<String> {
        self.loader.lock().as_ref().map(|l| l.model_name().to_string())
    }

    fn model_name_or_default(&self) -> String {
        self.model_name().unwrap_or_else(|| "model".to_string())
    }

    fn record_loader(&self, loader: Arc<dyn ModelLoader<M>>) {
        *self.loader.lock() = Some(loader);
    }

    fn recorded_loader(&self) -> Option<Arc<dyn ModelLoader<M>>> {
        self.loader.lock().clone()
    }

    /// Lease the on-device model without the transition lock.
    ///
    /// The flight is registered while the resident read lock is held, so a
    /// transition that clears the cache afterwards sees it.
    fn lease_resident(&self) -> Option<ModelLease<M>> {
        let resident = self.resident.read();
        let model = resident.as_ref()?.clone();
        let lease = self.lease(model);
        drop(resident);
        Some(lease)
    }

    fn lease(&self, model: Arc<M>) -> ModelLease<M> {
        ModelLease::new(model, self.state.clone(), self.flights.track())
    }

    fn install_on_device(&self, slot: &mut Slot<M>, model: M) -> Arc<M> {
        let model = Arc::new(model);
        *self.resident.write() = Some(model.clone());
        *slot = Slot::OnDevice(model.clone());
        model
    }

    async fn offload_locked(
        &self,
        slot: &mut Slot<M>,
        drain_timeout: Duration,
    ) -> Result<(), ResidencyError> {
        let model = match std::mem::replace(slot, Slot::Unloaded) {
            Slot::OnDevice(model) => model,
            other => {
                *slot = other;
                return Ok(());
            }
        };

        let transition = Transition::begin(&self.state);
        drop(self.resident.write().take());

        let model = match self.drain(model, drain_timeout).await {
            Ok(model) => model,
            Err(model) => {
                let in_flight = self.flights.in_flight();
                *self.resident.write() = Some(model.clone());
                *slot = Slot::OnDevice(model);
                transition.commit(Residency::OnDevice);
                return Err(ResidencyError::DrainTimeout { in_flight });
            }
        };

        let result = self.migrate(model, TransitionKind::Offload, Device::Host).await;
        let outcome = match result {
            Ok(model) => {
                *slot = Slot::OnHost(model);
                transition.commit(Residency::OnHost);
                Ok(())
            }
            Err(e) => Err(e),
        };
        self.clear_device_cache();
        outcome
    }

    /// Wait until this is the only reference to the model.
    ///
    /// Returns the shared model back if leases remain at the deadline.
    async fn drain(&self, mut model: Arc<M>, timeout: Duration) -> Result<M, Arc<M>> {
        let deadline = Instant::now() + timeout;
        loop {
            match Arc::try_unwrap(model) {
                Ok(owned) => return Ok(owned),
                Err(shared) => model = shared,
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(model);
            }
            debug!(in_flight = self.flights.in_flight(), "waiting for leases to drain");
            self.flights.wait_for_release(remaining.min(DRAIN_POLL)).await;
        }
    }

    /// Wait, up to the drain timeout, for leases on a released instance.
    async fn await_orphan(&self) -> Result<(), ResidencyError> {
        let Some(orphan) = self.orphan.lock().take() else {
            return Ok(());
        };

        let deadline = Instant::now() + self.config.drain_timeout;
        while orphan.strong_count() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let in_flight = self.flights.in_flight();
                warn!(in_flight, "released instance still leased, not loading another");
                *self.orphan.lock() = Some(orphan);
                return Err(ResidencyError::DrainTimeout { in_flight });
            }
            debug!(in_flight = self.flights.in_flight(), "waiting for released instance");
            self.flights.wait_for_release(remaining.min(DRAIN_POLL)).await;
        }
        Ok(())
    }

    async fn cold_start(&self, loader: Arc<dyn ModelLoader<M>>) -> Result<M, ResidencyError> {
        let name = loader.model_name().to_string();
        let span = TransitionSpan::new(TransitionKind::Load, &name);
        let started = Instant::now();

        let result = async {
            info!("loading model onto accelerator");
            run_blocking(move || loader.load()).await
        }
        .instrument(span.clone())
        .await;

        let elapsed = started.elapsed();
        span.record_result(&result);
        span.record_elapsed(elapsed);
        telemetry::record_transition(TransitionKind::Load, result.is_ok(), elapsed);

        match result {
            Ok(model) => {
                info!(model = %name, elapsed_ms = elapsed.as_millis() as u64, "model loaded");
                Ok(model)
            }
            Err(source) => {
                warn!(model = %name, error = %source, "model load failed");
                self.clear_device_cache();
                Err(ResidencyError::Load { model: name, source })
            }
        }
    }

    async fn migrate(
        &self,
        model: M,
        kind: TransitionKind,
        target: Device,
    ) -> Result<M, ResidencyError> {
        let name = self.model_name_or_default();
        let span = TransitionSpan::new(kind, &name);
        let started = Instant::now();

        let result = async {
            info!(%target, "migrating model");
            run_blocking(move || model.migrate(target)).await
        }
        .instrument(span.clone())
        .await;

        let elapsed = started.elapsed();
        span.record_result(&result);
        span.record_elapsed(elapsed);
        telemetry::record_transition(kind, result.is_ok(), elapsed);

        match result {
            Ok(model) => {
                info!(model = %name, %target, elapsed_ms = elapsed.as_millis() as u64, "model migrated");
                Ok(model)
            }
            Err(source) => {
                warn!(model = %name, %target, error = %source, "migration failed, model unloaded");
                Err(ResidencyError::Migration { model: name, target, source })
            }
        }
    }

    async fn query_memory(&self) -> Option<super::capability::DeviceMemory> {
        let device = self.device.clone();
        let query = tokio::task::spawn_blocking(move || device.memory_info());
        let result = match tokio::time::timeout(self.telemetry_timeout, query).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(DeviceError::TelemetryUnavailable(format!(
                "telemetry task failed: {}",
                e
            ))),
            // The blocking query is left to finish on its own.
            Err(_) => Err(DeviceError::TelemetryUnavailable(format!(
                "no answer within {:?}",
                self.telemetry_timeout
            ))),
        };

        match result {
            Ok(memory) => Some(memory),
            Err(e) => {
                debug!(error = %e, "device telemetry unavailable");
                None
            }
        }
    }

    fn clear_device_cache(&self) {
        if let Err(e) = self.device.clear_cache() {
            warn!(error = %e, "device cache clear failed");
        }
    }
}

/// Run a capability call on the blocking pool, mapping a panic to an error.
async fn run_blocking<T, F>(f: F) -> Result<T, ModelError>
where
    F: FnOnce() -> Result<T, ModelError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(ModelError::Panicked(e.to_string())),
    }
}
