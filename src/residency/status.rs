//! Lock-free state snapshot and the status report built from it.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Residency;

/// Point-in-time view of the manager, safe to serialize over IPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub residency: Residency,
    pub model_name: Option<String>,
    pub accelerator_memory_used_bytes: Option<u64>,
    pub accelerator_memory_total_bytes: Option<u64>,
    /// Seconds since the last access; `None` before the first access.
    pub idle_seconds: Option<f64>,
    pub idle_timeout_secs: Option<u64>,
    pub in_flight: u32,
    pub last_access_at: Option<DateTime<Utc>>,
}

/// Atomic state read by `status()` and the idle monitor.
///
/// Written only by the transition that holds the lock (residency) or by
/// lease bookkeeping (last access). Timestamps are stored as milliseconds
/// since `origin`, offset by one so zero means "never".
pub(crate) struct StateCell {
    residency: AtomicU8,
    last_access_ms: AtomicU64,
    idle_timeout_ms: AtomicU64,
    origin: Instant,
}

impl StateCell {
    pub(crate) fn new(idle_timeout: Option<Duration>) -> Self {
        let cell = Self {
            residency: AtomicU8::new(Residency::Unloaded.as_u8()),
            last_access_ms: AtomicU64::new(0),
            idle_timeout_ms: AtomicU64::new(0),
            origin: Instant::now(),
        };
        cell.set_idle_timeout(idle_timeout);
        cell
    }

    pub(crate) fn residency(&self) -> Residency {
        Residency::from_u8(self.residency.load(Ordering::Acquire))
    }

    pub(crate) fn set_residency(&self, residency: Residency) {
        self.residency.store(residency.as_u8(), Ordering::Release);
    }

    pub(crate) fn touch(&self) {
        let ms = self.origin.elapsed().as_millis() as u64 + 1;
        self.last_access_ms.fetch_max(ms, Ordering::AcqRel);
    }

    /// Time since the last access, `None` if never accessed.
    pub(crate) fn idle_duration(&self) -> Option<Duration> {
        match self.last_access_ms.load(Ordering::Acquire) {
            0 => None,
            stamp => {
                let now = self.origin.elapsed().as_millis() as u64 + 1;
                Some(Duration::from_millis(now.saturating_sub(stamp)))
            }
        }
    }

    /// True when at least `timeout` has passed since the last access.
    pub(crate) fn idle_for(&self, timeout: Duration) -> bool {
        self.idle_duration().map_or(true, |idle| idle >= timeout)
    }

    pub(crate) fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// A zero duration disables the timeout.
    pub(crate) fn set_idle_timeout(&self, timeout: Option<Duration>) {
        let ms = timeout.map_or(0, |t| t.as_millis().min(u64::MAX as u128) as u64);
        self.idle_timeout_ms.store(ms, Ordering::Release);
    }

    pub(crate) fn last_access_at(&self) -> Option<DateTime<Utc>> {
        let idle = self.idle_duration()?;
        let idle = chrono::Duration::from_std(idle).ok()?;
        Some(Utc::now() - idle)
    }
}
