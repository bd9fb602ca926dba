//! Prometheus metrics for the dispatch pipeline.
//!
//! All metrics are conditionally compiled behind the `metrics` feature
//! flag.
//!
//! # Metrics
//!
//! ## Counters
//! - `skua_records_received_total` - Queue records entering the dispatch loop
//! - `skua_jobs_submitted_total` - Job runs created, by target queue
//! - `skua_candidates_failed_total` - Candidate failures, by stage
//! - `skua_records_resolved_total` - Record resolutions, by disposition
//!
//! ## Histograms
//! - `skua_record_dispatch_seconds` - Per-record dispatch duration
#![cfg(feature = "metrics")]

use prometheus::{
    exponential_buckets, Counter, CounterVec, HistogramVec, Opts, Registry,
};
use std::sync::LazyLock;

/// Global Prometheus registry for skua metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Counter for queue records entering the dispatch loop.
pub static RECORDS_RECEIVED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    Counter::new(
        "skua_records_received_total",
        "Total number of queue records received",
    )
    .expect("skua_records_received_total metric creation failed")
});

/// Counter for job runs created in the compute scheduler.
///
/// Labels:
/// - `job_queue`: The compute queue the job was submitted to
pub static JOBS_SUBMITTED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "skua_jobs_submitted_total",
        "Total number of job runs created",
    );
    CounterVec::new(opts, &["job_queue"])
        .expect("skua_jobs_submitted_total metric creation failed")
});

/// Counter for candidates that failed to produce a job run.
///
/// Labels:
/// - `stage`: Where the candidate failed (validation, submission)
pub static CANDIDATES_FAILED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "skua_candidates_failed_total",
        "Total number of failed job request candidates",
    );
    CounterVec::new(opts, &["stage"])
        .expect("skua_candidates_failed_total metric creation failed")
});

/// Counter for record resolutions.
///
/// Labels:
/// - `disposition`: acked, malformed_body, failed_candidates, ack_failure
pub static RECORDS_RESOLVED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "skua_records_resolved_total",
        "Total number of resolved queue records",
    );
    CounterVec::new(opts, &["disposition"])
        .expect("skua_records_resolved_total metric creation failed")
});

/// Histogram for per-record dispatch duration in seconds.
///
/// Labels:
/// - `disposition`: acked, malformed_body, failed_candidates, ack_failure
pub static RECORD_DISPATCH_SECONDS: LazyLock<HistogramVec> =
    LazyLock::new(|| {
        let buckets = exponential_buckets(0.001, 2.0, 15)
            .expect("bucket creation failed");
        let opts = prometheus::HistogramOpts::new(
            "skua_record_dispatch_seconds",
            "Per-record dispatch duration in seconds",
        )
        .buckets(buckets);
        HistogramVec::new(opts, &["disposition"])
            .expect("skua_record_dispatch_seconds metric creation failed")
    });

/// Initialize all metrics by registering them with the global registry.
///
/// This function is idempotent - calling it multiple times is safe.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(RECORDS_RECEIVED_TOTAL.clone())
            as Box<dyn prometheus::core::Collector>,
        Box::new(JOBS_SUBMITTED_TOTAL.clone()),
        Box::new(CANDIDATES_FAILED_TOTAL.clone()),
        Box::new(RECORDS_RESOLVED_TOTAL.clone()),
        Box::new(RECORD_DISPATCH_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            let msg = e.to_string();
            if !msg
                .contains("Duplicate metrics collector registration attempted")
            {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Helper to count a received record.
pub fn record_record_received() {
    RECORDS_RECEIVED_TOTAL.inc();
}

/// Helper to count a created job run.
pub fn record_job_submitted(job_queue: &str) {
    JOBS_SUBMITTED_TOTAL.with_label_values(&[job_queue]).inc();
}

/// Helper to count a failed candidate.
pub fn record_candidate_failed(stage: &str) {
    CANDIDATES_FAILED_TOTAL.with_label_values(&[stage]).inc();
}

/// Helper to count a resolved record and observe its dispatch duration.
pub fn record_record_resolved(disposition: &str, duration_secs: f64) {
    RECORDS_RESOLVED_TOTAL
        .with_label_values(&[disposition])
        .inc();
    RECORD_DISPATCH_SECONDS
        .with_label_values(&[disposition])
        .observe(duration_secs);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}
