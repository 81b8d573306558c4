use async_trait::async_trait;
use featurejob::*;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum ManagerCall {
    Activate { cluster_id: ClusterId, spec: FeatureSpec },
    Deactivate { cluster_id: ClusterId },
    Update { cluster_id: ClusterId, spec: FeatureSpec },
}

/// Failure to return from the next state-changing call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManagerFailure {
    Transient(String),
    InvalidSpec(String),
}

impl ManagerFailure {
    fn into_error(self) -> FeatureError {
        match self {
            ManagerFailure::Transient(message) => FeatureError::transient(anyhow::anyhow!(message)),
            ManagerFailure::InvalidSpec(reason) => FeatureError::invalid_spec(reason),
        }
    }
}

/// [`FeatureManager`] that records calls and reports a fixed output.
#[derive(Clone)]
pub struct StaticFeatureManager {
    name: FeatureName,
    output: FeatureOutput,
    required_keys: Vec<String>,
    calls: Arc<Mutex<Vec<ManagerCall>>>,
    failures: Arc<Mutex<VecDeque<ManagerFailure>>>,
}

impl StaticFeatureManager {
    pub fn new(name: impl Into<FeatureName>) -> Self {
        Self {
            name: name.into(),
            output: FeatureOutput::new(),
            required_keys: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn with_output(mut self, output: FeatureOutput) -> Self {
        self.output = output;
        self
    }

    /// Make `validate_spec` reject specs without `key`.
    pub fn with_required_key(mut self, key: impl Into<String>) -> Self {
        self.required_keys.push(key.into());
        self
    }

    /// Fail the next state-changing call with `failure`.
    pub fn fail_next(&self, failure: ManagerFailure) {
        self.failures.lock().push_back(failure);
    }

    pub fn calls(&self) -> Vec<ManagerCall> {
        self.calls.lock().clone()
    }

    pub fn assert_call_count_eq(&self, expected: usize) {
        let actual = self.calls.lock().len();
        assert_eq!(actual, expected, "Expected {} manager calls, got {}", expected, actual);
    }

    fn record(&self, call: ManagerCall) -> Result<(), FeatureError> {
        self.calls.lock().push(call);
        match self.failures.lock().pop_front() {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FeatureManager for StaticFeatureManager {
    fn name(&self) -> &FeatureName {
        &self.name
    }

    fn validate_spec(&self, spec: &FeatureSpec) -> Result<(), FeatureError> {
        match self.required_keys.iter().find(|key| !spec.contains_key(key.as_str())) {
            Some(missing) => Err(FeatureError::invalid_spec(format!("missing {missing}"))),
            None => Ok(()),
        }
    }

    async fn output(&self, _cluster_id: ClusterId) -> Result<FeatureOutput, FeatureError> {
        Ok(self.output.clone())
    }

    async fn activate(&self, cluster_id: ClusterId, spec: FeatureSpec) -> Result<(), FeatureError> {
        self.record(ManagerCall::Activate { cluster_id, spec })
    }

    async fn deactivate(&self, cluster_id: ClusterId) -> Result<(), FeatureError> {
        self.record(ManagerCall::Deactivate { cluster_id })
    }

    async fn update(&self, cluster_id: ClusterId, spec: FeatureSpec) -> Result<(), FeatureError> {
        self.record(ManagerCall::Update { cluster_id, spec })
    }
}
