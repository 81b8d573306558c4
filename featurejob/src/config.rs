use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::signal::duration_ms::to_millis;
use crate::signal::{
    DEFAULT_RETRY_INTERVAL, FEATURE_JOB_SIGNAL_NAME, FEATURE_JOB_WORKFLOW_NAME, MIN_RETRY_INTERVAL,
};

/// Configuration for the async dispatcher.
///
/// Controls how instance ids are derived and which retry interval is
/// attached to the signals it composes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Prefix of every instance id (`{workflow_name}-{cluster_id}-{feature_name}`).
    pub workflow_name: String,
    /// Signal channel jobs are delivered on.
    pub signal_name: String,
    /// Retry interval stamped on every dispatched signal, in milliseconds.
    /// Values below [`MIN_RETRY_INTERVAL`] are raised to it.
    pub default_retry_interval_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workflow_name: FEATURE_JOB_WORKFLOW_NAME.to_string(),
            signal_name: FEATURE_JOB_SIGNAL_NAME.to_string(),
            default_retry_interval_ms: to_millis(DEFAULT_RETRY_INTERVAL),
        }
    }
}

impl DispatcherConfig {
    pub fn with_workflow_name(mut self, workflow_name: impl Into<String>) -> Self {
        self.workflow_name = workflow_name.into();
        self
    }

    pub fn with_signal_name(mut self, signal_name: impl Into<String>) -> Self {
        self.signal_name = signal_name.into();
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.default_retry_interval_ms = to_millis(retry_interval);
        self
    }

    /// Retry interval for dispatched signals, never below [`MIN_RETRY_INTERVAL`].
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.default_retry_interval_ms).max(MIN_RETRY_INTERVAL)
    }
}

/// Configuration for the in-process runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// The only signal name `signal_with_start` accepts.
    pub signal_name: String,
    /// Events buffered per subscriber by the default event bus.
    pub event_capacity: usize,
    /// How long `shutdown` waits for each instance task, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            signal_name: FEATURE_JOB_SIGNAL_NAME.to_string(),
            event_capacity: 1024,
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl RuntimeConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
