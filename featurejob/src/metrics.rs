//! Prometheus metrics for feature job orchestration.
//!
//! Compiled only with the `metrics` feature.
//!
//! # Metrics
//!
//! ## Counters
//! - `featurejob_dispatches_total` - Signals delivered, by action and whether a run was created
//! - `featurejob_activity_attempts_total` - Activity attempts, by activity and status
//! - `featurejob_retries_scheduled_total` - Retry waits entered
//! - `featurejob_preemptions_total` - Retry waits abandoned for a newer job
//! - `featurejob_instances_terminated_total` - Instance runs ended, by status
//!
//! ## Gauges
//! - `featurejob_live_instances` - Instances currently running in process
//!
//! ## Histograms
//! - `featurejob_activity_duration_seconds` - Activity attempt duration
#![cfg(feature = "metrics")]

use prometheus::{
    CounterVec, Gauge, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, exponential_buckets,
};
use std::sync::LazyLock;

/// Global Prometheus registry for feature job metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Labels: `action`, `created`.
pub static DISPATCHES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new("featurejob_dispatches_total", "Total number of job signals dispatched");
    CounterVec::new(opts, &["action", "created"])
        .expect("featurejob_dispatches_total metric creation failed")
});

/// Labels: `activity`, `status` (success, retryable, fatal).
pub static ACTIVITY_ATTEMPTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "featurejob_activity_attempts_total",
        "Total number of activity attempts",
    );
    CounterVec::new(opts, &["activity", "status"])
        .expect("featurejob_activity_attempts_total metric creation failed")
});

/// Labels: `action`.
pub static RETRIES_SCHEDULED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "featurejob_retries_scheduled_total",
        "Total number of retry waits entered",
    );
    CounterVec::new(opts, &["action"])
        .expect("featurejob_retries_scheduled_total metric creation failed")
});

pub static PREEMPTIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "featurejob_preemptions_total",
        "Total number of retry waits abandoned for a newer job",
    )
    .expect("featurejob_preemptions_total metric creation failed")
});

/// Labels: `status` (completed, failed, stopped).
pub static INSTANCES_TERMINATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "featurejob_instances_terminated_total",
        "Total number of instance runs ended",
    );
    CounterVec::new(opts, &["status"])
        .expect("featurejob_instances_terminated_total metric creation failed")
});

pub static LIVE_INSTANCES: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("featurejob_live_instances", "Instances currently running")
        .expect("featurejob_live_instances metric creation failed")
});

/// Labels: `activity`, `status`.
pub static ACTIVITY_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.005, 2.0, 16).expect("bucket creation failed");
    let opts = HistogramOpts::new(
        "featurejob_activity_duration_seconds",
        "Activity attempt duration in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["activity", "status"])
        .expect("featurejob_activity_duration_seconds metric creation failed")
});

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(DISPATCHES_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(ACTIVITY_ATTEMPTS_TOTAL.clone()),
        Box::new(RETRIES_SCHEDULED_TOTAL.clone()),
        Box::new(PREEMPTIONS_TOTAL.clone()),
        Box::new(INSTANCES_TERMINATED_TOTAL.clone()),
        Box::new(LIVE_INSTANCES.clone()),
        Box::new(ACTIVITY_DURATION_SECONDS.clone()),
    ] {
        match registry.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

pub fn record_dispatch(action: &str, created: bool) {
    let created = if created { "true" } else { "false" };
    DISPATCHES_TOTAL.with_label_values(&[action, created]).inc();
}

pub fn record_activity(activity: &str, status: &str, duration_secs: f64) {
    ACTIVITY_ATTEMPTS_TOTAL
        .with_label_values(&[activity, status])
        .inc();
    ACTIVITY_DURATION_SECONDS
        .with_label_values(&[activity, status])
        .observe(duration_secs);
}

pub fn record_retry(action: &str) {
    RETRIES_SCHEDULED_TOTAL.with_label_values(&[action]).inc();
}

pub fn record_preemption() {
    PREEMPTIONS_TOTAL.inc();
}

pub fn record_terminated(status: &str) {
    INSTANCES_TERMINATED_TOTAL.with_label_values(&[status]).inc();
}

pub fn set_live_instances(count: f64) {
    LIVE_INSTANCES.set(count);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}
