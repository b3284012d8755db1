//! Metrics facade wrappers.
//!
//! Thin helpers over the `metrics` macros so metric names and label sets
//! stay consistent. Without an installed recorder every call is a no-op.

use std::time::Duration;

use crate::residency::{Residency, TransitionKind};

/// How a lease was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeasePath {
    /// Model already resident; no transition lock taken.
    Fast,
    /// Lease issued under the transition lock.
    Locked,
}

impl LeasePath {
    fn as_str(self) -> &'static str {
        match self {
            LeasePath::Fast => "fast",
            LeasePath::Locked => "locked",
        }
    }
}

/// Record the outcome and duration of a transition.
pub fn record_transition(kind: TransitionKind, ok: bool, elapsed: Duration) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!(
        "residency_transitions_total",
        "transition" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("residency_transition_seconds", "transition" => kind.as_str())
        .record(elapsed.as_secs_f64());
}

/// Publish the current residency as a gauge (0 unloaded, 1 device, 2 host).
pub fn record_residency(residency: Residency) {
    metrics::gauge!("residency_state").set(f64::from(residency.as_u8()));
}

pub fn record_lease(path: LeasePath) {
    metrics::counter!("residency_leases_total", "path" => path.as_str()).increment(1);
}
