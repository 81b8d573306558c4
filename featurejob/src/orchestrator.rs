//! The per-feature job state machine.
//!
//! One instance exists per (cluster, feature) key. It consumes job signals
//! one at a time, runs the matching activity, retries retryable failures on
//! a timer while staying preemptable by newer jobs, and terminates once its
//! inbox is drained.
//!
//! ```text
//! AwaitingFirstSignal --JobReceived--> Executing(job)
//! Executing(job) --SucceededMorePending--> Executing(next)
//! Executing(job) --SucceededDone--> Terminated(ok)
//! Executing(job) --RetryNeeded--> RetryWait(job)
//! Executing(job) --Fatal--> Terminated(error)
//! RetryWait(job) --RetryTimerFired--> Executing(job)
//! RetryWait(job) --RetryPreempted--> Executing(next)
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::classifier;
use crate::error::{ActivityError, JobError};
use crate::retry::{self, RetryDecision};
use crate::runtime::{RetryWake, WorkflowContext};
use crate::signal::duration_ms::to_millis;
use crate::signal::{JobInput, JobSignal};

/// State of an orchestrator instance.
#[derive(Debug)]
pub enum JobState {
    AwaitingFirstSignal,
    Executing(JobSignal),
    RetryWait(JobSignal),
    Terminated(Result<(), JobError>),
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::AwaitingFirstSignal => "awaiting_first_signal",
            JobState::Executing(_) => "executing",
            JobState::RetryWait(_) => "retry_wait",
            JobState::Terminated(_) => "terminated",
        }
    }
}

/// Event that moves the state machine from one state to the next.
#[derive(Debug)]
pub enum Transition {
    /// The first job arrived on the inbox.
    JobReceived(JobSignal),
    /// The job succeeded and another one was already queued.
    SucceededMorePending { next: JobSignal },
    /// The job succeeded and the inbox is empty.
    SucceededDone,
    /// The job failed with a retryable error.
    RetryNeeded { job: JobSignal, error: ActivityError },
    /// The retry timer fired; the same job runs again with the same input.
    RetryTimerFired { job: JobSignal },
    /// A newer job arrived during the retry wait. The waiting job is dropped.
    RetryPreempted { abandoned: JobSignal, next: JobSignal },
    /// Classification or execution failed for good.
    Fatal(JobError),
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::JobReceived(_) => "job_received",
            Transition::SucceededMorePending { .. } => "succeeded_more_pending",
            Transition::SucceededDone => "succeeded_done",
            Transition::RetryNeeded { .. } => "retry_needed",
            Transition::RetryTimerFired { .. } => "retry_timer_fired",
            Transition::RetryPreempted { .. } => "retry_preempted",
            Transition::Fatal(_) => "fatal",
        }
    }
}

/// Counters describing what a successfully terminated instance did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    /// Jobs whose activity completed successfully.
    pub jobs_completed: u32,
    /// Activity executions, including retries.
    pub attempts: u32,
    /// Retry waits entered.
    pub retries: u32,
    /// Retry waits abandoned because a newer job arrived.
    pub preempted: u32,
}

/// Orchestrator for the jobs of one feature on one cluster.
#[derive(Debug)]
pub struct FeatureJobWorkflow {
    input: JobInput,
    report: JobReport,
}

impl FeatureJobWorkflow {
    pub fn new(input: JobInput) -> Self {
        Self {
            input,
            report: JobReport::default(),
        }
    }

    pub fn input(&self) -> &JobInput {
        &self.input
    }

    /// Drive the instance until it terminates.
    ///
    /// # Errors
    ///
    /// Returns the [`JobError`] that terminated the instance: an
    /// unsupported action, a non-retryable activity failure, or a failed
    /// first receive.
    pub async fn run<C>(mut self, ctx: &mut C) -> Result<JobReport, JobError>
    where
        C: WorkflowContext + ?Sized,
    {
        let mut state = JobState::AwaitingFirstSignal;
        loop {
            let from = state.name();
            let transition = match state {
                JobState::AwaitingFirstSignal => Self::receive_first(ctx).await,
                JobState::Executing(job) => self.execute(ctx, job).await,
                JobState::RetryWait(job) => Self::wait_for_retry(ctx, job).await,
                JobState::Terminated(outcome) => return outcome.map(|()| self.report),
            };

            debug!(
                cluster_id = %self.input.cluster_id,
                feature = %self.input.feature_name,
                from,
                transition = transition.name(),
                "feature job transition"
            );
            ctx.observe(&transition);
            state = self.apply(transition);
        }
    }

    async fn receive_first<C>(ctx: &mut C) -> Transition
    where
        C: WorkflowContext + ?Sized,
    {
        match ctx.receive_signal().await {
            Ok(job) => Transition::JobReceived(job),
            Err(err) => Transition::Fatal(JobError::Inbox(err)),
        }
    }

    async fn execute<C>(&mut self, ctx: &mut C, job: JobSignal) -> Transition
    where
        C: WorkflowContext + ?Sized,
    {
        let input = match classifier::classify(&self.input, &job) {
            Ok(input) => input,
            Err(err) => return Transition::Fatal(err.into()),
        };

        self.report.attempts = self.report.attempts.saturating_add(1);
        match ctx.execute_activity(&input).await {
            Ok(()) => match ctx.try_receive_signal() {
                Some(next) => Transition::SucceededMorePending { next },
                None => Transition::SucceededDone,
            },
            Err(error) => match retry::evaluate(&error) {
                RetryDecision::Retry => Transition::RetryNeeded { job, error },
                RetryDecision::Fatal => Transition::Fatal(JobError::Activity {
                    activity: input.name(),
                    input: Box::new(input),
                    source: error,
                }),
            },
        }
    }

    async fn wait_for_retry<C>(ctx: &mut C, job: JobSignal) -> Transition
    where
        C: WorkflowContext + ?Sized,
    {
        match ctx.wait_for_retry(job.retry_delay()).await {
            RetryWake::TimerFired => Transition::RetryTimerFired { job },
            RetryWake::Signal(next) => Transition::RetryPreempted {
                abandoned: job,
                next,
            },
        }
    }

    fn apply(&mut self, transition: Transition) -> JobState {
        match transition {
            Transition::JobReceived(job) => JobState::Executing(job),
            Transition::SucceededMorePending { next } => {
                self.report.jobs_completed = self.report.jobs_completed.saturating_add(1);
                JobState::Executing(next)
            }
            Transition::SucceededDone => {
                self.report.jobs_completed = self.report.jobs_completed.saturating_add(1);
                JobState::Terminated(Ok(()))
            }
            Transition::RetryNeeded { job, error } => {
                self.report.retries = self.report.retries.saturating_add(1);
                info!(
                    cluster_id = %self.input.cluster_id,
                    feature = %self.input.feature_name,
                    action = %job.action,
                    retry_interval_ms = to_millis(job.retry_delay()),
                    error = %error,
                    "activity failed with a retryable error, waiting to retry"
                );
                JobState::RetryWait(job)
            }
            Transition::RetryTimerFired { job } => JobState::Executing(job),
            Transition::RetryPreempted { abandoned, next } => {
                self.report.preempted = self.report.preempted.saturating_add(1);
                info!(
                    cluster_id = %self.input.cluster_id,
                    feature = %self.input.feature_name,
                    abandoned = %abandoned.action,
                    next = %next.action,
                    "retry wait preempted by a newer job"
                );
                JobState::Executing(next)
            }
            Transition::Fatal(err) => {
                error!(
                    cluster_id = %self.input.cluster_id,
                    feature = %self.input.feature_name,
                    error = %err,
                    "feature job terminated with error"
                );
                JobState::Terminated(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{
        ACTIVATE_ACTIVITY_NAME, ActivityInput, DEACTIVATE_ACTIVITY_NAME, UPDATE_ACTIVITY_NAME,
    };
    use crate::error::{ClassificationError, InboxError};
    use crate::feature::{ClusterId, FeatureSpec};
    use crate::signal::{JobAction, MIN_RETRY_INTERVAL};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Context whose inbox, activity results and retry wakes are scripted.
    #[derive(Default)]
    struct ScriptedContext {
        first: Option<Result<JobSignal, InboxError>>,
        queued: VecDeque<JobSignal>,
        outcomes: VecDeque<Result<(), ActivityError>>,
        wakes: VecDeque<RetryWake>,
        executed: Vec<ActivityInput>,
        waits: Vec<Duration>,
        observed: Vec<&'static str>,
    }

    impl ScriptedContext {
        fn with_first(job: JobSignal) -> Self {
            Self {
                first: Some(Ok(job)),
                ..Self::default()
            }
        }

        fn queue(mut self, job: JobSignal) -> Self {
            self.queued.push_back(job);
            self
        }

        fn outcome(mut self, outcome: Result<(), ActivityError>) -> Self {
            self.outcomes.push_back(outcome);
            self
        }

        fn wake(mut self, wake: RetryWake) -> Self {
            self.wakes.push_back(wake);
            self
        }

        fn executed_names(&self) -> Vec<&'static str> {
            self.executed.iter().map(ActivityInput::name).collect()
        }
    }

    #[async_trait]
    impl WorkflowContext for ScriptedContext {
        async fn receive_signal(&mut self) -> Result<JobSignal, InboxError> {
            self.first.take().unwrap_or(Err(InboxError::Closed))
        }

        fn try_receive_signal(&mut self) -> Option<JobSignal> {
            self.queued.pop_front()
        }

        async fn execute_activity(&mut self, input: &ActivityInput) -> Result<(), ActivityError> {
            self.executed.push(input.clone());
            self.outcomes.pop_front().unwrap_or(Ok(()))
        }

        async fn wait_for_retry(&mut self, interval: Duration) -> RetryWake {
            self.waits.push(interval);
            self.wakes.pop_front().unwrap_or(RetryWake::TimerFired)
        }

        fn observe(&mut self, transition: &Transition) {
            self.observed.push(transition.name());
        }
    }

    fn spec(value: serde_json::Value) -> FeatureSpec {
        match value {
            serde_json::Value::Object(map) => map,
            _ => FeatureSpec::new(),
        }
    }

    fn workflow() -> FeatureJobWorkflow {
        FeatureJobWorkflow::new(JobInput::new(ClusterId(42), "monitoring"))
    }

    #[tokio::test]
    async fn single_job_terminates_when_inbox_is_empty() {
        let mut ctx =
            ScriptedContext::with_first(JobSignal::activate(spec(json!({ "enabled": true }))));

        let report = workflow().run(&mut ctx).await.unwrap();

        assert_eq!(
            report,
            JobReport {
                jobs_completed: 1,
                attempts: 1,
                retries: 0,
                preempted: 0
            }
        );
        assert_eq!(ctx.executed_names(), vec![ACTIVATE_ACTIVITY_NAME]);
        assert_eq!(ctx.observed, vec!["job_received", "succeeded_done"]);
    }

    #[tokio::test]
    async fn queued_jobs_run_in_arrival_order() {
        let mut ctx = ScriptedContext::with_first(JobSignal::activate(FeatureSpec::new()))
            .queue(JobSignal::update(spec(json!({ "level": "debug" }))))
            .queue(JobSignal::deactivate());

        let report = workflow().run(&mut ctx).await.unwrap();

        assert_eq!(report.jobs_completed, 3);
        assert_eq!(
            ctx.executed_names(),
            vec![
                ACTIVATE_ACTIVITY_NAME,
                UPDATE_ACTIVITY_NAME,
                DEACTIVATE_ACTIVITY_NAME
            ]
        );
        assert!(ctx.waits.is_empty());
    }

    #[tokio::test]
    async fn retry_timer_reruns_the_identical_job() {
        let interval = Duration::from_secs(5);
        let mut ctx = ScriptedContext::with_first(
            JobSignal::activate(spec(json!({ "enabled": true }))).with_retry_interval(interval),
        )
        .outcome(Err(ActivityError::retryable("api server unavailable")))
        .outcome(Ok(()))
        .wake(RetryWake::TimerFired);

        let report = workflow().run(&mut ctx).await.unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.retries, 1);
        assert_eq!(report.jobs_completed, 1);
        assert_eq!(ctx.waits, vec![interval]);
        assert_eq!(ctx.executed.len(), 2);
        assert_eq!(ctx.executed[0], ctx.executed[1]);
    }

    #[tokio::test]
    async fn zero_retry_interval_waits_the_minimum() {
        let mut ctx = ScriptedContext::with_first(
            JobSignal::deactivate().with_retry_interval(Duration::ZERO),
        )
        .outcome(Err(ActivityError::retryable("namespace terminating")))
        .outcome(Err(ActivityError::retryable("namespace terminating")))
        .wake(RetryWake::TimerFired)
        .wake(RetryWake::TimerFired);

        let report = workflow().run(&mut ctx).await.unwrap();

        assert_eq!(report.retries, 2);
        assert_eq!(ctx.waits, vec![MIN_RETRY_INTERVAL, MIN_RETRY_INTERVAL]);
    }

    #[tokio::test]
    async fn newer_job_preempts_a_pending_retry() {
        let update = JobSignal::update(spec(json!({ "enabled": true, "level": "debug" })));
        let mut ctx =
            ScriptedContext::with_first(JobSignal::activate(spec(json!({ "enabled": true }))))
                .outcome(Err(ActivityError::retryable("webhook not ready")))
                .wake(RetryWake::Signal(update));

        let report = workflow().run(&mut ctx).await.unwrap();

        assert_eq!(ctx.executed_names(), vec![ACTIVATE_ACTIVITY_NAME, UPDATE_ACTIVITY_NAME]);
        assert_eq!(
            ctx.executed[1].spec(),
            Some(&spec(json!({ "enabled": true, "level": "debug" })))
        );
        assert_eq!(report.preempted, 1);
        assert_eq!(report.jobs_completed, 1);
        assert_eq!(
            ctx.observed,
            vec!["job_received", "retry_needed", "retry_preempted", "succeeded_done"]
        );
    }

    #[tokio::test]
    async fn unsupported_action_terminates_without_executing() {
        let mut ctx = ScriptedContext::with_first(JobSignal::new(JobAction::from("restart"), None))
            .queue(JobSignal::deactivate());

        let err = workflow().run(&mut ctx).await.unwrap_err();

        assert!(matches!(
            err,
            JobError::Classification(ClassificationError::UnsupportedAction { ref action })
                if action == "restart"
        ));
        assert!(ctx.executed.is_empty());
        assert_eq!(ctx.queued.len(), 1);
    }

    #[tokio::test]
    async fn unsupported_action_arriving_during_retry_wait_is_fatal() {
        let mut ctx = ScriptedContext::with_first(JobSignal::deactivate())
            .outcome(Err(ActivityError::retryable("still terminating")))
            .wake(RetryWake::Signal(JobSignal::new(JobAction::from("scale"), None)));

        let err = workflow().run(&mut ctx).await.unwrap_err();

        assert_eq!(err.label(), "unclassified");
        assert_eq!(ctx.executed_names(), vec![DEACTIVATE_ACTIVITY_NAME]);
    }

    #[tokio::test]
    async fn fatal_error_skips_the_remaining_inbox() {
        let mut ctx = ScriptedContext::with_first(JobSignal::activate(FeatureSpec::new()))
            .queue(JobSignal::deactivate())
            .outcome(Err(ActivityError::fatal("chart not found")));

        let err = workflow().run(&mut ctx).await.unwrap_err();

        match err {
            JobError::Activity {
                activity,
                input,
                source,
            } => {
                assert_eq!(activity, ACTIVATE_ACTIVITY_NAME);
                assert_eq!(input.feature_name().as_str(), "monitoring");
                assert_eq!(source.message(), "chart not found");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.executed.len(), 1);
        assert_eq!(ctx.queued.len(), 1, "inbox must not be consulted");
        assert!(ctx.waits.is_empty());
    }

    #[tokio::test]
    async fn failed_first_receive_is_surfaced() {
        let mut ctx = ScriptedContext {
            first: Some(Err(InboxError::Delivery("history corrupted".into()))),
            ..ScriptedContext::default()
        };

        let err = workflow().run(&mut ctx).await.unwrap_err();

        assert!(matches!(err, JobError::Inbox(InboxError::Delivery(_))));
        assert!(ctx.executed.is_empty());
    }

    #[tokio::test]
    async fn retries_continue_until_success() {
        let mut ctx = ScriptedContext::with_first(JobSignal::update(FeatureSpec::new()));
        for _ in 0..4 {
            ctx = ctx
                .outcome(Err(ActivityError::retryable("rollout pending")))
                .wake(RetryWake::TimerFired);
        }

        let report = workflow().run(&mut ctx).await.unwrap();

        assert_eq!(report.attempts, 5);
        assert_eq!(report.retries, 4);
        assert_eq!(ctx.waits.len(), 4);
    }
}
