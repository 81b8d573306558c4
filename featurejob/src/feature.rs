use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Opaque feature configuration forwarded verbatim to the activity executor.
pub type FeatureSpec = serde_json::Map<String, serde_json::Value>;

/// Read-only feature state reported by a feature manager.
pub type FeatureOutput = serde_json::Map<String, serde_json::Value>;

/// Identifier of a previously provisioned cluster.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClusterId(pub u64);

impl ClusterId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ClusterId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Name of an installable feature such as `monitoring` or `logging`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureName(String);

impl FeatureName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FeatureName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FeatureName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for FeatureName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for FeatureName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The (cluster, feature) pair that owns exactly one orchestrator instance.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FeatureKey {
    pub cluster_id: ClusterId,
    pub feature_name: FeatureName,
}

impl FeatureKey {
    pub fn new(cluster_id: impl Into<ClusterId>, feature_name: impl Into<FeatureName>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            feature_name: feature_name.into(),
        }
    }
}

impl Display for FeatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.cluster_id, self.feature_name)
    }
}
