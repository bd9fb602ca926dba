//! Tracing and telemetry instrumentation for the dispatch pipeline.
//!
//! Span constructors cover the three externally-visible stages of a record's
//! life (dispatch, submit, ack); the `record_*` helpers log structured
//! events and, when the `metrics` feature is enabled, drive the Prometheus
//! counters in [`crate::metrics`]. Everything here is a no-op beyond logging
//! when the feature is disabled.

use tracing::{info_span, Span};

/// Create a tracing span covering the dispatch of one queue record.
#[must_use]
pub fn record_dispatch_span(message_id: impl AsRef<str>) -> Span {
    info_span!(
        "skua.dispatch",
        message_id = %message_id.as_ref(),
    )
}

/// Create a tracing span covering one scheduler submission call.
#[must_use]
pub fn submit_span(job_name: impl AsRef<str>, job_queue: impl AsRef<str>) -> Span {
    info_span!(
        "skua.submit",
        job_name = %job_name.as_ref(),
        job_queue = %job_queue.as_ref(),
    )
}

/// Create a tracing span covering the acknowledgement of one record.
#[must_use]
pub fn ack_span(message_id: impl AsRef<str>) -> Span {
    info_span!(
        "skua.ack",
        message_id = %message_id.as_ref(),
    )
}

/// Record that a queue record entered the dispatch loop.
pub fn record_record_received(message_id: impl AsRef<str>, receive_count: u32) {
    tracing::debug!(
        message_id = %message_id.as_ref(),
        receive_count,
        "record received"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_record_received();
}

/// Record that a job run was created in the compute scheduler.
pub fn record_job_submitted(job_queue: impl AsRef<str>) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_job_submitted(job_queue.as_ref());
    #[cfg(not(feature = "metrics"))]
    let _ = job_queue;
}

/// Record that a candidate failed at the given stage.
pub fn record_candidate_failed(stage: &str) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_candidate_failed(stage);
    #[cfg(not(feature = "metrics"))]
    let _ = stage;
}

/// Record the resolution of one record and the time dispatch took.
pub fn record_record_resolved(disposition: &str, duration_secs: f64) {
    tracing::info!(disposition, duration_secs, "record resolved");

    #[cfg(feature = "metrics")]
    crate::metrics::record_record_resolved(disposition, duration_secs);
}
