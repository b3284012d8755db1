//! Telemetry module for GG-RESIDENCY.
//!
//! Provides structured logging, transition spans, and metrics recording.
//! All output is file/stderr-based - no network exporters.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{record_lease, record_residency, record_transition, LeasePath};
pub use spans::{SpanExt, TransitionSpan};
