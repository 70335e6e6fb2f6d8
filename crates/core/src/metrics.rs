//! Prometheus metrics for the conversion core.
//!
//! The collectors are process-wide statics. Binaries register them with
//! their own registry through [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};
use std::time::Duration;

use crate::encoder::AudioFormat;
use crate::orchestrator::JobOutcome;

// =============================================================================
// Conversions
// =============================================================================

/// Finished conversions by format and result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("audioconv_conversions_total", "Total finished conversions"),
        &["format", "result"], // "success", "failed", "canceled"
    )
    .unwrap()
});

/// Wall-clock duration of conversions.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "audioconv_conversion_duration_seconds",
            "Duration of a single conversion",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["format"],
    )
    .unwrap()
});

/// Encoder processes that could not be started.
pub static SPAWN_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "audioconv_spawn_failures_total",
        "Encoder processes that failed to start",
    )
    .unwrap()
});

// =============================================================================
// Batches
// =============================================================================

/// Finished batches by result.
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("audioconv_batches_total", "Total finished batches"),
        &["result"], // "completed", "aborted"
    )
    .unwrap()
});

/// Label value for a job outcome.
pub fn outcome_label(outcome: &JobOutcome) -> &'static str {
    match outcome {
        JobOutcome::Succeeded => "success",
        JobOutcome::Failed(_) => "failed",
        JobOutcome::Canceled => "canceled",
    }
}

pub(crate) fn record_conversion(format: AudioFormat, outcome: &JobOutcome, elapsed: Duration) {
    CONVERSIONS_TOTAL
        .with_label_values(&[format.id(), outcome_label(outcome)])
        .inc();
    CONVERSION_DURATION
        .with_label_values(&[format.id()])
        .observe(elapsed.as_secs_f64());
}

pub(crate) fn record_batch(aborted: bool) {
    let result = if aborted { "aborted" } else { "completed" };
    BATCHES_TOTAL.with_label_values(&[result]).inc();
}

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(SPAWN_FAILURES_TOTAL.clone()),
        Box::new(BATCHES_TOTAL.clone()),
    ]
}
