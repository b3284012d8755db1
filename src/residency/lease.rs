//! Leases on the resident model and in-flight tracking.
//!
//! Every caller of `acquire` holds a [`ModelLease`] for the duration of its
//! use. Offload and release wait for outstanding leases before moving or
//! dropping the model, so a migration never runs underneath a `generate`.

use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use super::status::StateCell;

/// Counts outstanding leases and wakes drainers when one is returned.
pub struct FlightTracker {
    in_flight: AtomicU32,
    notify: Notify,
}

impl FlightTracker {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicU32::new(0),
            notify: Notify::new(),
        }
    }

    /// Increment the in-flight count (returns RAII guard).
    pub fn track(self: &Arc<Self>) -> FlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        FlightGuard { tracker: self.clone() }
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until a guard is dropped or `timeout` elapses.
    pub async fn wait_for_release(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

impl Default for FlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that decrements the in-flight count on drop.
pub struct FlightGuard {
    tracker: Arc<FlightTracker>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.tracker.notify.notify_one();
    }
}

/// Shared access to the on-device model.
///
/// Dereferences to the model. Dropping the lease releases the model
/// reference first, then refreshes the last-access time, then decrements
/// the in-flight count, so a drainer woken by the count can take sole
/// ownership.
pub struct ModelLease<M> {
    model: Option<Arc<M>>,
    state: Arc<StateCell>,
    _flight: FlightGuard,
}

impl<M> std::fmt::Debug for ModelLease<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLease").finish_non_exhaustive()
    }
}

impl<M> ModelLease<M> {
    pub(crate) fn new(model: Arc<M>, state: Arc<StateCell>, flight: FlightGuard) -> Self {
        state.touch();
        Self {
            model: Some(model),
            state,
            _flight: flight,
        }
    }

    /// True if both leases refer to the same model instance.
    pub fn same_instance(&self, other: &ModelLease<M>) -> bool {
        match (&self.model, &other.model) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<M> Deref for ModelLease<M> {
    type Target = M;

    fn deref(&self) -> &M {
        // Only `Drop` clears the option.
        match &self.model {
            Some(model) => model,
            None => unreachable!("model lease used after drop"),
        }
    }
}

impl<M> Drop for ModelLease<M> {
    fn drop(&mut self) {
        drop(self.model.take());
        self.state.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_increments_count() {
        let tracker = Arc::new(FlightTracker::new());
        assert_eq!(tracker.in_flight(), 0);

        let guard = tracker.track();
        assert_eq!(tracker.in_flight(), 1);

        drop(guard);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_multiple_guards() {
        let tracker = Arc::new(FlightTracker::new());
        let guards: Vec<_> = (0..5).map(|_| tracker.track()).collect();
        assert_eq!(tracker.in_flight(), 5);
        drop(guards);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_lease_drop_releases_reference_before_count() {
        let tracker = Arc::new(FlightTracker::new());
        let state = Arc::new(StateCell::new(None));
        let model = Arc::new(42u32);

        let lease = ModelLease::new(model.clone(), state.clone(), tracker.track());
        assert_eq!(*lease, 42);
        assert_eq!(Arc::strong_count(&model), 2);
        assert!(state.idle_duration().is_some());

        drop(lease);
        assert_eq!(Arc::strong_count(&model), 1);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_release_wakes_on_drop() {
        let tracker = Arc::new(FlightTracker::new());
        let guard = tracker.track();
        let waiter = tracker.clone();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            waiter.wait_for_release(Duration::from_secs(5)).await;
            start.elapsed()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        let waited = handle.await.unwrap();
        assert!(waited < Duration::from_secs(5));
    }
}
