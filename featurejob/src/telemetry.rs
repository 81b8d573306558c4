//! Tracing and telemetry instrumentation for feature jobs.
//!
//! Span constructors for the three places work happens (dispatching a
//! signal, running an instance, executing an activity) and `record_*`
//! helpers that log an event and, with the `metrics` feature enabled,
//! update the matching Prometheus series.
//!
//! # Example
//!
//! ```ignore
//! use featurejob::telemetry::instrument_activity;
//!
//! instrument_activity(instance_id.as_str(), input.name(), attempt, async {
//!     // ... run the activity
//! })
//! .await;
//! ```

use std::future::Future;
use std::time::Duration;
use tracing::{Instrument, Span, info_span};

use crate::signal::duration_ms::to_millis;

/// Create a tracing span for a dispatch (signal-with-start) call.
#[must_use]
pub fn dispatch_span(instance_id: impl AsRef<str>, action: impl AsRef<str>) -> Span {
    info_span!(
        "featurejob.dispatch",
        instance_id = %instance_id.as_ref(),
        action = %action.as_ref(),
    )
}

/// Create a tracing span covering one run of an instance.
#[must_use]
pub fn instance_span(instance_id: impl AsRef<str>, run_id: impl AsRef<str>) -> Span {
    info_span!(
        "featurejob.instance",
        instance_id = %instance_id.as_ref(),
        run_id = %run_id.as_ref(),
    )
}

/// Create a tracing span for one activity attempt.
#[must_use]
pub fn activity_span(
    instance_id: impl AsRef<str>,
    activity: impl AsRef<str>,
    attempt: u32,
) -> Span {
    info_span!(
        "featurejob.activity",
        instance_id = %instance_id.as_ref(),
        activity = %activity.as_ref(),
        attempt = attempt,
    )
}

/// Instrument a future with a dispatch span.
pub fn instrument_dispatch<F>(
    instance_id: impl AsRef<str>,
    action: impl AsRef<str>,
    future: F,
) -> impl Future<Output = F::Output>
where
    F: Future,
{
    future.instrument(dispatch_span(instance_id, action))
}

/// Instrument a future with an activity span.
pub fn instrument_activity<F>(
    instance_id: impl AsRef<str>,
    activity: impl AsRef<str>,
    attempt: u32,
    future: F,
) -> impl Future<Output = F::Output>
where
    F: Future,
{
    future.instrument(activity_span(instance_id, activity, attempt))
}

/// Record a signal delivered to an instance.
pub fn record_dispatch(instance_id: impl AsRef<str>, action: impl AsRef<str>, created: bool) {
    tracing::info!(
        instance_id = %instance_id.as_ref(),
        action = %action.as_ref(),
        created,
        "feature job dispatched"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_dispatch(action.as_ref(), created);
}

/// Record the end of one activity attempt.
///
/// `status` is `success`, `retryable` or `fatal`.
pub fn record_activity(activity: impl AsRef<str>, status: impl AsRef<str>, elapsed: Duration) {
    tracing::debug!(
        activity = %activity.as_ref(),
        status = %status.as_ref(),
        elapsed_ms = to_millis(elapsed),
        "activity attempt finished"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_activity(activity.as_ref(), status.as_ref(), elapsed.as_secs_f64());
}

/// Record a retry wait being scheduled.
pub fn record_retry(instance_id: impl AsRef<str>, action: impl AsRef<str>, interval: Duration) {
    tracing::debug!(
        instance_id = %instance_id.as_ref(),
        action = %action.as_ref(),
        retry_interval_ms = to_millis(interval),
        "retry scheduled"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_retry(action.as_ref());
}

/// Record a pending retry abandoned for a newer job.
pub fn record_preemption(instance_id: impl AsRef<str>, abandoned: impl AsRef<str>) {
    tracing::debug!(
        instance_id = %instance_id.as_ref(),
        abandoned = %abandoned.as_ref(),
        "retry preempted"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_preemption();
}

/// Record an instance run ending with `status`.
pub fn record_terminated(instance_id: impl AsRef<str>, status: impl AsRef<str>) {
    tracing::info!(
        instance_id = %instance_id.as_ref(),
        status = %status.as_ref(),
        "feature job instance terminated"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_terminated(status.as_ref());
}

/// Update the number of live instances.
pub fn set_live_instances(count: usize) {
    tracing::trace!(count, "live instances updated");

    #[cfg(feature = "metrics")]
    crate::metrics::set_live_instances(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_span() {
        let span = dispatch_span("job-42-monitoring", "activate");
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "featurejob.dispatch");
        }
    }

    #[test]
    fn test_activity_span() {
        let span = activity_span("job-42-monitoring", "cluster-feature-update", 2);
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "featurejob.activity");
        }
    }

    #[tokio::test]
    async fn test_instrument_activity_passes_output_through() {
        let out =
            instrument_activity("job-1-logging", "cluster-feature-activate", 1, async { 7 }).await;
        assert_eq!(out, 7);
    }

    #[test]
    fn test_record_helpers_do_not_panic() {
        record_dispatch("job-1-logging", "activate", true);
        record_activity("cluster-feature-activate", "retryable", Duration::from_millis(12));
        record_retry("job-1-logging", "activate", Duration::from_secs(60));
        record_preemption("job-1-logging", "activate");
        record_terminated("job-1-logging", "completed");
        set_live_instances(3);
    }
}
