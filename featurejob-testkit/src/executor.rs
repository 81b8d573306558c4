use async_trait::async_trait;
use featurejob::*;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Scripted result of one activity attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    /// Fail with an error tagged retryable.
    Retryable(String),
    /// Fail with an error tagged fatal.
    Fatal(String),
    /// Succeed once the given time has elapsed.
    SucceedAfter(Duration),
}

impl Outcome {
    pub fn retryable(message: impl Into<String>) -> Self {
        Outcome::Retryable(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Outcome::Fatal(message.into())
    }
}

#[derive(Clone, Debug)]
pub struct Invocation {
    pub activity: &'static str,
    pub input: ActivityInput,
    /// When the attempt started.
    pub at: Instant,
}

/// [`ActivityExecutor`] that records every attempt and answers from a script.
///
/// Each activity name has a queue of outcomes consumed one per attempt;
/// once it is empty the activity's default outcome applies, which is
/// [`Outcome::Succeed`] unless set otherwise.
#[derive(Clone, Default)]
pub struct MockExecutor {
    invocations: Arc<Mutex<Vec<Invocation>>>,
    scripts: Arc<Mutex<HashMap<&'static str, VecDeque<Outcome>>>>,
    defaults: Arc<Mutex<HashMap<&'static str, Outcome>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for the next attempts of `activity`.
    pub fn with_outcomes(
        self,
        activity: &'static str,
        outcomes: impl IntoIterator<Item = Outcome>,
    ) -> Self {
        self.scripts
            .lock()
            .entry(activity)
            .or_default()
            .extend(outcomes);
        self
    }

    /// Outcome of `activity` once its queue is exhausted.
    pub fn with_default(self, activity: &'static str, outcome: Outcome) -> Self {
        self.set_default(activity, outcome);
        self
    }

    pub fn set_default(&self, activity: &'static str, outcome: Outcome) {
        self.defaults.lock().insert(activity, outcome);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    /// Activity names in invocation order.
    pub fn activity_names(&self) -> Vec<&'static str> {
        self.invocations.lock().iter().map(|i| i.activity).collect()
    }

    pub fn invocations_of(&self, activity: &str) -> Vec<Invocation> {
        self.invocations
            .lock()
            .iter()
            .filter(|i| i.activity == activity)
            .cloned()
            .collect()
    }

    pub fn assert_invocation_count_eq(&self, expected: usize) {
        let actual = self.invocations.lock().len();
        assert_eq!(
            actual, expected,
            "Expected {} activity invocations, got {}",
            expected, actual
        );
    }

    fn next_outcome(&self, activity: &'static str) -> Outcome {
        if let Some(outcome) = self
            .scripts
            .lock()
            .get_mut(activity)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }
        self.defaults
            .lock()
            .get(activity)
            .cloned()
            .unwrap_or(Outcome::Succeed)
    }

    async fn run(&self, input: ActivityInput) -> Result<(), ActivityError> {
        let activity = input.name();
        tracing::debug!(activity, %input, "mock activity invoked");
        self.invocations.lock().push(Invocation {
            activity,
            input,
            at: Instant::now(),
        });

        match self.next_outcome(activity) {
            Outcome::Succeed => Ok(()),
            Outcome::Retryable(message) => Err(ActivityError::retryable(message)),
            Outcome::Fatal(message) => Err(ActivityError::fatal(message)),
            Outcome::SucceedAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ActivityExecutor for MockExecutor {
    async fn execute_activate(
        &self,
        cluster_id: ClusterId,
        feature_name: &FeatureName,
        spec: &FeatureSpec,
    ) -> Result<(), ActivityError> {
        self.run(ActivityInput::Activate {
            cluster_id,
            feature_name: feature_name.clone(),
            spec: spec.clone(),
        })
        .await
    }

    async fn execute_deactivate(
        &self,
        cluster_id: ClusterId,
        feature_name: &FeatureName,
    ) -> Result<(), ActivityError> {
        self.run(ActivityInput::Deactivate {
            cluster_id,
            feature_name: feature_name.clone(),
        })
        .await
    }

    async fn execute_update(
        &self,
        cluster_id: ClusterId,
        feature_name: &FeatureName,
        spec: &FeatureSpec,
    ) -> Result<(), ActivityError> {
        self.run(ActivityInput::Update {
            cluster_id,
            feature_name: feature_name.clone(),
            spec: spec.clone(),
        })
        .await
    }
}
