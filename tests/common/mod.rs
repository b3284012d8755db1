//! Shared test doubles: a counting model, its loader, and a fake device.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gg_residency::residency::{
    Device, DeviceError, DeviceMemory, DeviceRuntime, ManagerConfig, ModelError, ModelLoader,
    NoDeviceRuntime, ResidencyManager, ResidentModel,
};

/// Observed calls and injected faults, shared by every instance.
#[derive(Default)]
pub struct Counters {
    pub loads: AtomicUsize,
    pub migrations: AtomicUsize,
    pub live: AtomicI64,
    pub max_live: AtomicI64,
    pub fail_load: AtomicBool,
    pub fail_migrate: AtomicBool,
    pub load_delay_ms: AtomicU64,
    pub migrate_delay_ms: AtomicU64,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn migrations(&self) -> usize {
        self.migrations.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> i64 {
        self.live.load(Ordering::SeqCst)
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_migrate(&self, fail: bool) {
        self.fail_migrate.store(fail, Ordering::SeqCst);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        self.load_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

pub struct MockModel {
    pub id: usize,
    pub device: Device,
    counters: Arc<Counters>,
}

impl ResidentModel for MockModel {
    fn migrate(mut self, target: Device) -> Result<Self, ModelError> {
        self.counters.migrations.fetch_add(1, Ordering::SeqCst);
        let delay = self.counters.migrate_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.counters.fail_migrate.load(Ordering::SeqCst) {
            return Err(ModelError::backend("injected migration failure"));
        }
        self.device = target;
        Ok(self)
    }
}

impl Drop for MockModel {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockLoader {
    counters: Arc<Counters>,
}

impl MockLoader {
    pub fn shared(counters: &Arc<Counters>) -> Arc<dyn ModelLoader<MockModel>> {
        Arc::new(Self {
            counters: counters.clone(),
        })
    }
}

impl ModelLoader<MockModel> for MockLoader {
    fn load(&self) -> Result<MockModel, ModelError> {
        let delay = self.counters.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.counters.fail_load.load(Ordering::SeqCst) {
            return Err(ModelError::backend("injected load failure"));
        }

        let id = self.counters.loads.fetch_add(1, Ordering::SeqCst) + 1;
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(MockModel {
            id,
            device: Device::Accelerator,
            counters: self.counters.clone(),
        })
    }

    fn model_name(&self) -> &str {
        "mock-tts"
    }
}

/// Device runtime with fixed figures and switchable failures.
#[derive(Default)]
pub struct FakeDevice {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub fail_telemetry: AtomicBool,
    pub fail_clear: AtomicBool,
    /// Stall every memory query this long, like a wedged driver.
    pub memory_delay_ms: AtomicU64,
    pub clears: AtomicUsize,
}

impl FakeDevice {
    pub fn with_memory(used_bytes: u64, total_bytes: u64) -> Arc<Self> {
        Arc::new(Self {
            used_bytes,
            total_bytes,
            ..Default::default()
        })
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl DeviceRuntime for FakeDevice {
    fn memory_info(&self) -> Result<DeviceMemory, DeviceError> {
        let delay = self.memory_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail_telemetry.load(Ordering::SeqCst) {
            return Err(DeviceError::TelemetryUnavailable("fake device offline".into()));
        }
        Ok(DeviceMemory {
            used_bytes: self.used_bytes,
            total_bytes: self.total_bytes,
        })
    }

    fn clear_cache(&self) -> Result<(), DeviceError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(DeviceError::CacheClear("fake allocator refused".into()));
        }
        Ok(())
    }
}

pub fn manager_with(config: ManagerConfig) -> Arc<ResidencyManager<MockModel>> {
    Arc::new(ResidencyManager::new(Arc::new(NoDeviceRuntime), config))
}

pub fn manager() -> Arc<ResidencyManager<MockModel>> {
    manager_with(ManagerConfig::default())
}

/// Poll `check` every 10ms until it holds or `deadline` passes.
pub async fn wait_until<F: Fn() -> bool>(deadline: Duration, check: F) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
