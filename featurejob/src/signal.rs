use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

use crate::feature::{ClusterId, FeatureKey, FeatureName, FeatureSpec};

/// Name the feature job workflow is registered under.
pub const FEATURE_JOB_WORKFLOW_NAME: &str = "cluster-feature-job";

/// Name of the signal channel jobs are delivered on.
pub const FEATURE_JOB_SIGNAL_NAME: &str = "job";

/// Retry interval attached to signals composed by the dispatcher.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest retry wait an instance honours. Smaller intervals, zero
/// included, are raised to this value.
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Requested state change for a feature.
///
/// Serialized as a lowercase string. Unknown strings decode into
/// [`JobAction::Unsupported`] so that the classifier, not the decoder,
/// decides their fate.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobAction {
    Activate,
    Deactivate,
    Update,
    Unsupported(String),
}

impl JobAction {
    pub fn as_str(&self) -> &str {
        match self {
            JobAction::Activate => "activate",
            JobAction::Deactivate => "deactivate",
            JobAction::Update => "update",
            JobAction::Unsupported(raw) => raw,
        }
    }
}

impl Display for JobAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for JobAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "activate" => JobAction::Activate,
            "deactivate" => JobAction::Deactivate,
            "update" => JobAction::Update,
            _ => JobAction::Unsupported(value),
        }
    }
}

impl From<&str> for JobAction {
    fn from(value: &str) -> Self {
        JobAction::from(value.to_string())
    }
}

impl From<JobAction> for String {
    fn from(value: JobAction) -> Self {
        match value {
            JobAction::Unsupported(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

/// One requested state change, delivered into an instance inbox.
///
/// Signals are value objects and are never mutated once dispatched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSignal {
    pub action: JobAction,
    /// Only meaningful for activate and update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<FeatureSpec>,
    /// Delay between attempts while the job keeps failing with a retryable error.
    #[serde(rename = "retry_interval_ms", with = "duration_ms")]
    pub retry_interval: Duration,
}

impl JobSignal {
    pub fn new(action: JobAction, spec: Option<FeatureSpec>) -> Self {
        Self {
            action,
            spec,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn activate(spec: FeatureSpec) -> Self {
        Self::new(JobAction::Activate, Some(spec))
    }

    pub fn deactivate() -> Self {
        Self::new(JobAction::Deactivate, None)
    }

    pub fn update(spec: FeatureSpec) -> Self {
        Self::new(JobAction::Update, Some(spec))
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Wait before the next attempt: `retry_interval`, at least [`MIN_RETRY_INTERVAL`].
    pub fn retry_delay(&self) -> Duration {
        self.retry_interval.max(MIN_RETRY_INTERVAL)
    }
}

/// Fixed input of an orchestrator instance, set when the instance is created.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobInput {
    pub cluster_id: ClusterId,
    pub feature_name: FeatureName,
}

impl JobInput {
    pub fn new(cluster_id: impl Into<ClusterId>, feature_name: impl Into<FeatureName>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            feature_name: feature_name.into(),
        }
    }

    pub fn key(&self) -> FeatureKey {
        FeatureKey {
            cluster_id: self.cluster_id,
            feature_name: self.feature_name.clone(),
        }
    }
}

impl From<FeatureKey> for JobInput {
    fn from(key: FeatureKey) -> Self {
        Self {
            cluster_id: key.cluster_id,
            feature_name: key.feature_name,
        }
    }
}

/// Deterministic identity of an orchestrator instance.
///
/// Repeated dispatches for the same key always produce the same id, which
/// is what lets the runtime join them onto one live instance.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(workflow_name: &str, key: &FeatureKey) -> Self {
        Self(format!(
            "{}-{}-{}",
            workflow_name, key.cluster_id, key.feature_name
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Durations as whole milliseconds on the wire.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Milliseconds in `value`, saturating at `u64::MAX`.
    pub(crate) fn to_millis(value: Duration) -> u64 {
        u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(to_millis(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
