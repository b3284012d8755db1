//! Span utilities and extension traits for residency tracing.
//!
//! Provides standardized span creation and result recording.

use std::time::Duration;

use tracing::{info_span, Span};

use crate::residency::TransitionKind;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;

    /// Record how long the operation took.
    fn record_elapsed(&self, elapsed: Duration);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }

    fn record_elapsed(&self, elapsed: Duration) {
        self.record("elapsed_ms", elapsed.as_millis() as u64);
    }
}

/// Factory for creating standardized transition spans.
pub struct TransitionSpan;

impl TransitionSpan {
    /// Create a span for one residency transition.
    ///
    /// Fields included:
    /// - `transition`: load, restore, offload or release
    /// - `model`: model name recorded with the loader
    /// - `status`: filled in by `SpanExt::record_result`
    /// - `error.message`: filled in on error
    /// - `elapsed_ms`: filled in after completion
    pub fn new(kind: TransitionKind, model: &str) -> Span {
        info_span!(
            "residency_transition",
            transition = %kind,
            model = %model,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        )
    }
}
