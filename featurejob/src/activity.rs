use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::{ActivityError, ErrorKind};
use crate::feature::{ClusterId, FeatureName, FeatureSpec};

/// Activity that deploys and activates a feature.
pub const ACTIVATE_ACTIVITY_NAME: &str = "cluster-feature-activate";
/// Activity that removes a feature.
pub const DEACTIVATE_ACTIVITY_NAME: &str = "cluster-feature-deactivate";
/// Activity that reconfigures an active feature.
pub const UPDATE_ACTIVITY_NAME: &str = "cluster-feature-update";

/// Input record of one activity, produced by the classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum ActivityInput {
    Activate {
        cluster_id: ClusterId,
        feature_name: FeatureName,
        spec: FeatureSpec,
    },
    Deactivate {
        cluster_id: ClusterId,
        feature_name: FeatureName,
    },
    Update {
        cluster_id: ClusterId,
        feature_name: FeatureName,
        spec: FeatureSpec,
    },
}

impl ActivityInput {
    /// Registered name of the activity this input belongs to.
    pub fn name(&self) -> &'static str {
        match self {
            ActivityInput::Activate { .. } => ACTIVATE_ACTIVITY_NAME,
            ActivityInput::Deactivate { .. } => DEACTIVATE_ACTIVITY_NAME,
            ActivityInput::Update { .. } => UPDATE_ACTIVITY_NAME,
        }
    }

    pub fn cluster_id(&self) -> ClusterId {
        match self {
            ActivityInput::Activate { cluster_id, .. }
            | ActivityInput::Deactivate { cluster_id, .. }
            | ActivityInput::Update { cluster_id, .. } => *cluster_id,
        }
    }

    pub fn feature_name(&self) -> &FeatureName {
        match self {
            ActivityInput::Activate { feature_name, .. }
            | ActivityInput::Deactivate { feature_name, .. }
            | ActivityInput::Update { feature_name, .. } => feature_name,
        }
    }

    pub fn spec(&self) -> Option<&FeatureSpec> {
        match self {
            ActivityInput::Activate { spec, .. } | ActivityInput::Update { spec, .. } => Some(spec),
            ActivityInput::Deactivate { .. } => None,
        }
    }
}

impl Display for ActivityInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{json}")
    }
}

/// Result of a single execution attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityOutcome {
    Succeeded,
    Failed { kind: ErrorKind, error: String },
}

impl ActivityOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ActivityOutcome::Succeeded => "success",
            ActivityOutcome::Failed { kind, .. } => kind.as_str(),
        }
    }
}

/// Ephemeral record of one execution attempt: activity name, input and outcome.
///
/// Produced once per attempt for telemetry and never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityInvocation {
    pub activity: String,
    pub attempt: u32,
    pub input: ActivityInput,
    pub outcome: ActivityOutcome,
}

impl ActivityInvocation {
    pub fn record(input: &ActivityInput, attempt: u32, result: &Result<(), ActivityError>) -> Self {
        let outcome = match result {
            Ok(()) => ActivityOutcome::Succeeded,
            Err(err) => ActivityOutcome::Failed {
                kind: err.kind(),
                error: err.to_string(),
            },
        };
        Self {
            activity: input.name().to_string(),
            attempt,
            input: input.clone(),
            outcome,
        }
    }
}

/// Provisioning actions consumed by the orchestrator.
///
/// Every operation may run more than once for the same logical job, since
/// the runtime delivers activities at least once. Implementations must be
/// idempotent or convergent. Errors decide their own retryability through
/// [`ErrorKind`]; anything not tagged retryable ends the job.
#[async_trait]
pub trait ActivityExecutor: Send + Sync {
    /// Deploy and activate the feature on the cluster.
    async fn execute_activate(
        &self,
        cluster_id: ClusterId,
        feature_name: &FeatureName,
        spec: &FeatureSpec,
    ) -> Result<(), ActivityError>;

    /// Remove the feature from the cluster.
    async fn execute_deactivate(
        &self,
        cluster_id: ClusterId,
        feature_name: &FeatureName,
    ) -> Result<(), ActivityError>;

    /// Apply a new spec to an active feature.
    async fn execute_update(
        &self,
        cluster_id: ClusterId,
        feature_name: &FeatureName,
        spec: &FeatureSpec,
    ) -> Result<(), ActivityError>;
}

/// Route an activity input to the matching executor operation.
pub async fn invoke<E>(executor: &E, input: &ActivityInput) -> Result<(), ActivityError>
where
    E: ActivityExecutor + ?Sized,
{
    match input {
        ActivityInput::Activate {
            cluster_id,
            feature_name,
            spec,
        } => executor.execute_activate(*cluster_id, feature_name, spec).await,
        ActivityInput::Deactivate {
            cluster_id,
            feature_name,
        } => executor.execute_deactivate(*cluster_id, feature_name).await,
        ActivityInput::Update {
            cluster_id,
            feature_name,
            spec,
        } => executor.execute_update(*cluster_id, feature_name, spec).await,
    }
}
