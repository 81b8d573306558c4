use async_trait::async_trait;
use featurejob::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct SignalCall {
    pub instance_id: InstanceId,
    pub signal_name: String,
    pub signal: JobSignal,
    pub input: JobInput,
}

/// [`WorkflowClient`] that records deliveries without running anything.
///
/// The first delivery to an instance id reports `created: true`, later
/// ones join the same run.
#[derive(Clone, Default)]
pub struct RecordingClient {
    calls: Arc<Mutex<Vec<SignalCall>>>,
    runs: Arc<Mutex<HashMap<InstanceId, RunId>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every following call with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    pub fn calls(&self) -> Vec<SignalCall> {
        self.calls.lock().clone()
    }

    pub fn assert_call_count_eq(&self, expected: usize) {
        let actual = self.calls.lock().len();
        assert_eq!(actual, expected, "Expected {} signal calls, got {}", expected, actual);
    }
}

#[async_trait]
impl WorkflowClient for RecordingClient {
    async fn signal_with_start(
        &self,
        instance_id: &InstanceId,
        signal_name: &str,
        signal: JobSignal,
        input: JobInput,
    ) -> anyhow::Result<WorkflowExecution> {
        if let Some(message) = self.failure.lock().clone() {
            anyhow::bail!(message);
        }

        self.calls.lock().push(SignalCall {
            instance_id: instance_id.clone(),
            signal_name: signal_name.to_string(),
            signal,
            input,
        });

        let mut runs = self.runs.lock();
        let created = !runs.contains_key(instance_id);
        let run_id = *runs.entry(instance_id.clone()).or_default();
        Ok(WorkflowExecution {
            instance_id: instance_id.clone(),
            run_id,
            created,
        })
    }
}
