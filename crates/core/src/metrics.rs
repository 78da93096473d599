//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Engine gateway (initialization, jobs, job duration)
//! - Session (validation rejections)
//! - Artifacts (relabels)
//!
//! Nothing is registered here. Callers that expose metrics pass
//! [`all_metrics`] to their own registry, as the `vidpress` binary does.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Engine Gateway
// =============================================================================

/// Engine initialization attempts by result.
pub static ENGINE_INIT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vidpress_engine_init_total",
            "Total transcoding engine initialization attempts",
        ),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Jobs submitted to the gateway by result.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidpress_jobs_total", "Total transcoding jobs by result"),
        &["result"], // "success", "failed", "cancelled", "timeout", "busy"
    )
    .unwrap()
});

/// Job duration in seconds, staging and cleanup included.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidpress_job_duration_seconds",
            "Duration of transcoding jobs",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Session / Artifacts
// =============================================================================

/// Files rejected by the input validator.
pub static VALIDATION_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidpress_validation_rejections_total",
        "Total files rejected as not a video",
    )
    .unwrap()
});

/// Completed artifacts relabeled to another container of the same family.
pub static ARTIFACT_RELABELS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidpress_artifact_relabels_total",
        "Total artifacts relabeled without a new job",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Engine
        Box::new(ENGINE_INIT_TOTAL.clone()),
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        // Session / Artifacts
        Box::new(VALIDATION_REJECTIONS.clone()),
        Box::new(ARTIFACT_RELABELS.clone()),
    ]
}
