use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::activity::{self, ActivityExecutor, ActivityInput};
use crate::config::RuntimeConfig;
use crate::error::{ActivityError, InboxError, JobError};
use crate::events::{
    EventMeta, FeatureJobEvent, FeatureJobEventPayload, JobEventPublisher, TerminationOutcome,
};
use crate::orchestrator::{FeatureJobWorkflow, JobReport, Transition};
use crate::signal::{InstanceId, JobInput, JobSignal};
use crate::telemetry;

use super::client::{RunId, WorkflowClient, WorkflowExecution};
use super::context::{RetryWake, WorkflowContext};

/// Token for signaling shutdown to instance tasks.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel is not missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

struct LiveInstance {
    run_id: RunId,
    inbox: mpsc::UnboundedSender<JobSignal>,
}

struct RuntimeInner {
    config: RuntimeConfig,
    executor: Arc<dyn ActivityExecutor>,
    events: Arc<dyn JobEventPublisher>,
    instances: Mutex<HashMap<InstanceId, LiveInstance>>,
    shutdown: ShutdownToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Non-durable runtime hosting orchestrator instances as tokio tasks.
///
/// Keeps one live instance per [`InstanceId`]. Each instance owns an
/// unbounded FIFO inbox; `signal_with_start` either appends to the inbox
/// of the live instance or starts a new run, under a single lock. Nothing
/// survives a process restart.
#[derive(Clone)]
pub struct InProcRuntime {
    inner: Arc<RuntimeInner>,
}

impl fmt::Debug for InProcRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcRuntime")
            .field("config", &self.inner.config)
            .field("live_instances", &self.inner.instances.lock().len())
            .field("shutdown_cancelled", &self.inner.shutdown.is_cancelled())
            .finish()
    }
}

impl InProcRuntime {
    pub fn new(
        config: RuntimeConfig,
        executor: Arc<dyn ActivityExecutor>,
        events: Arc<dyn JobEventPublisher>,
    ) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                executor,
                events,
                instances: Mutex::new(HashMap::new()),
                shutdown: ShutdownToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn events(&self) -> Arc<dyn JobEventPublisher> {
        Arc::clone(&self.inner.events)
    }

    /// Subscribe to lifecycle events of all instances.
    pub fn subscribe(&self) -> broadcast::Receiver<FeatureJobEvent> {
        self.inner.events.subscribe()
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.inner.shutdown.clone()
    }

    /// Ids of the instances currently live, sorted.
    pub fn live_instances(&self) -> Vec<InstanceId> {
        let mut ids: Vec<_> = self.inner.instances.lock().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn is_live(&self, instance_id: &InstanceId) -> bool {
        self.inner.instances.lock().contains_key(instance_id)
    }

    /// Stop every instance, including ones waiting to retry, and wait for
    /// their tasks to exit.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        tracing::info!("initiating shutdown of in-process feature job runtime");

        {
            // Cancel under the registry lock: no run can start after this.
            let _instances = self.inner.instances.lock();
            self.inner.shutdown.cancel();
        }

        let handles = std::mem::take(&mut *self.inner.tasks.lock());
        let timeout = self.inner.config.shutdown_timeout();
        for handle in handles {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("instance task failed: {e:?}"),
                Err(_) => tracing::warn!("instance task timed out during shutdown"),
            }
        }

        let mut instances = self.inner.instances.lock();
        instances.clear();
        telemetry::set_live_instances(0);

        tracing::info!("in-process feature job runtime shutdown complete");
        Ok(())
    }
}

#[async_trait]
impl WorkflowClient for InProcRuntime {
    async fn signal_with_start(
        &self,
        instance_id: &InstanceId,
        signal_name: &str,
        signal: JobSignal,
        input: JobInput,
    ) -> anyhow::Result<WorkflowExecution> {
        if signal_name != self.inner.config.signal_name {
            bail!(
                "unknown signal name {signal_name:?}, expected {:?}",
                self.inner.config.signal_name
            );
        }

        let action = signal.action.clone();
        let execution = self.inner.deliver(instance_id, signal, input)?;

        self.inner.publish(
            instance_id,
            execution.run_id,
            format!("dispatch-{}-{}", execution.run_id, action),
            FeatureJobEventPayload::Dispatched {
                action: action.clone(),
                created: execution.created,
            },
        );
        telemetry::record_dispatch(instance_id, action.as_str(), execution.created);

        Ok(execution)
    }
}

impl RuntimeInner {
    fn publish(
        &self,
        instance_id: &InstanceId,
        run_id: RunId,
        idempotency_key: String,
        payload: FeatureJobEventPayload,
    ) {
        let meta = EventMeta::for_run(instance_id, run_id, idempotency_key);
        let event = FeatureJobEvent::new(meta, payload);
        if let Err(err) = self.events.publish(event) {
            tracing::error!(instance_id = %instance_id, "publish feature job event failed: {err}");
        }
    }

    fn deliver(
        self: &Arc<Self>,
        instance_id: &InstanceId,
        signal: JobSignal,
        input: JobInput,
    ) -> anyhow::Result<WorkflowExecution> {
        let mut instances = self.instances.lock();
        if self.shutdown.is_cancelled() {
            bail!("runtime is shut down");
        }

        let signal = match instances.get(instance_id) {
            Some(live) => match live.inbox.send(signal) {
                Ok(()) => {
                    return Ok(WorkflowExecution {
                        instance_id: instance_id.clone(),
                        run_id: live.run_id,
                        created: false,
                    });
                }
                // The run is gone without having retired itself.
                Err(mpsc::error::SendError(signal)) => signal,
            },
            None => signal,
        };

        let run_id = self.start_run(&mut instances, instance_id.clone(), input, vec![signal]);
        Ok(WorkflowExecution {
            instance_id: instance_id.clone(),
            run_id,
            created: true,
        })
    }

    /// Register a new run with `pending` already in its inbox and spawn it.
    /// Must be called with the instance registry locked and the runtime
    /// not shut down.
    fn start_run(
        self: &Arc<Self>,
        instances: &mut HashMap<InstanceId, LiveInstance>,
        instance_id: InstanceId,
        input: JobInput,
        pending: Vec<JobSignal>,
    ) -> RunId {
        let (tx, rx) = mpsc::unbounded_channel();
        for signal in pending {
            let _ = tx.send(signal);
        }

        let run_id = RunId::new();
        instances.insert(
            instance_id.clone(),
            LiveInstance {
                run_id,
                inbox: tx,
            },
        );
        telemetry::set_live_instances(instances.len());

        self.publish(
            &instance_id,
            run_id,
            format!("start-{run_id}"),
            FeatureJobEventPayload::InstanceStarted { run_id },
        );

        let handle = tokio::spawn(Self::run_instance(
            Arc::clone(self),
            instance_id,
            run_id,
            input,
            rx,
        ));
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);

        run_id
    }

    fn run_instance(
        self: Arc<Self>,
        instance_id: InstanceId,
        run_id: RunId,
        input: JobInput,
        inbox: mpsc::UnboundedReceiver<JobSignal>,
    ) -> BoxFuture<'static, ()> {
        let span = telemetry::instance_span(&instance_id, run_id.to_string());
        async move {
            let mut ctx = InProcContext {
                instance_id: instance_id.clone(),
                run_id,
                inbox,
                executor: Arc::clone(&self.executor),
                events: Arc::clone(&self.events),
                attempt: 0,
            };
            let workflow = FeatureJobWorkflow::new(input.clone());
            let shutdown = self.shutdown.clone();

            let outcome = tokio::select! {
                outcome = workflow.run(&mut ctx) => Some(outcome),
                _ = shutdown.cancelled() => None,
            };

            self.retire(instance_id, run_id, input, &mut ctx.inbox, outcome);
        }
        .instrument(span)
        .boxed()
    }

    /// Remove a finished run from the registry and settle its inbox.
    ///
    /// Runs under the registry lock so that no dispatch can land between
    /// the removal and the drain. Signals found in the drained inbox
    /// arrived after the run's final empty-inbox check; after a successful
    /// run they start a fresh one in their original order.
    fn retire(
        self: &Arc<Self>,
        instance_id: InstanceId,
        run_id: RunId,
        input: JobInput,
        inbox: &mut mpsc::UnboundedReceiver<JobSignal>,
        outcome: Option<Result<JobReport, JobError>>,
    ) {
        let mut instances = self.instances.lock();
        if instances
            .get(&instance_id)
            .is_some_and(|live| live.run_id == run_id)
        {
            instances.remove(&instance_id);
        }

        inbox.close();
        let mut leftovers = Vec::new();
        while let Ok(signal) = inbox.try_recv() {
            leftovers.push(signal);
        }

        let termination = match &outcome {
            Some(Ok(report)) => TerminationOutcome::Completed {
                jobs_completed: report.jobs_completed,
            },
            Some(Err(err)) => TerminationOutcome::Failed {
                reason: err.label().to_string(),
                error: err.to_string(),
            },
            None => TerminationOutcome::Stopped,
        };
        telemetry::record_terminated(&instance_id, termination.status());
        self.publish(
            &instance_id,
            run_id,
            format!("terminate-{run_id}"),
            FeatureJobEventPayload::Terminated {
                run_id,
                outcome: termination,
            },
        );

        if !leftovers.is_empty() {
            match outcome {
                Some(Ok(_)) if !self.shutdown.is_cancelled() => {
                    tracing::info!(
                        instance_id = %instance_id,
                        pending = leftovers.len(),
                        "signals arrived after the inbox drained, starting a new run"
                    );
                    self.start_run(&mut instances, instance_id, input, leftovers);
                }
                _ => {
                    tracing::warn!(
                        instance_id = %instance_id,
                        dropped = leftovers.len(),
                        "dropping signals queued behind a terminated run"
                    );
                }
            }
        }

        telemetry::set_live_instances(instances.len());
    }
}

/// Per-run capabilities backed by a tokio channel and the shared executor.
struct InProcContext {
    instance_id: InstanceId,
    run_id: RunId,
    inbox: mpsc::UnboundedReceiver<JobSignal>,
    executor: Arc<dyn ActivityExecutor>,
    events: Arc<dyn JobEventPublisher>,
    attempt: u32,
}

impl InProcContext {
    fn publish(&self, idempotency_key: String, payload: FeatureJobEventPayload) {
        let event = FeatureJobEvent::new(
            EventMeta::for_run(&self.instance_id, self.run_id, idempotency_key),
            payload,
        );
        if let Err(err) = self.events.publish(event) {
            tracing::error!(
                instance_id = %self.instance_id,
                "publish feature job event failed: {err}"
            );
        }
    }
}

#[async_trait]
impl WorkflowContext for InProcContext {
    async fn receive_signal(&mut self) -> Result<JobSignal, InboxError> {
        self.inbox.recv().await.ok_or(InboxError::Closed)
    }

    fn try_receive_signal(&mut self) -> Option<JobSignal> {
        self.inbox.try_recv().ok()
    }

    async fn execute_activity(&mut self, input: &ActivityInput) -> Result<(), ActivityError> {
        self.attempt = self.attempt.saturating_add(1);
        let attempt = self.attempt;
        let activity = input.name();

        self.publish(
            format!("activity-{}-{attempt}", self.run_id),
            FeatureJobEventPayload::ActivityStarted {
                activity: activity.to_string(),
                attempt,
            },
        );

        let started = tokio::time::Instant::now();
        let result = telemetry::instrument_activity(
            &self.instance_id,
            activity,
            attempt,
            activity::invoke(self.executor.as_ref(), input),
        )
        .await;

        let payload = match &result {
            Ok(()) => FeatureJobEventPayload::ActivitySucceeded {
                activity: activity.to_string(),
                attempt,
            },
            Err(err) => FeatureJobEventPayload::ActivityFailed {
                activity: activity.to_string(),
                attempt,
                retryable: err.is_retryable(),
                error: err.to_string(),
            },
        };
        let invocation = activity::ActivityInvocation::record(input, attempt, &result);
        telemetry::record_activity(activity, invocation.outcome.status(), started.elapsed());
        self.publish(format!("activity-{}-{attempt}-done", self.run_id), payload);

        result
    }

    async fn wait_for_retry(&mut self, interval: Duration) -> RetryWake {
        let timer = tokio::time::sleep(interval);
        tokio::pin!(timer);
        tokio::select! {
            biased;
            Some(signal) = self.inbox.recv() => RetryWake::Signal(signal),
            _ = &mut timer => RetryWake::TimerFired,
        }
    }

    fn observe(&mut self, transition: &Transition) {
        match transition {
            Transition::RetryNeeded { job, .. } => {
                telemetry::record_retry(&self.instance_id, job.action.as_str(), job.retry_delay());
                self.publish(
                    format!("retry-{}-{}", self.run_id, self.attempt),
                    FeatureJobEventPayload::RetryScheduled {
                        action: job.action.clone(),
                        retry_interval: job.retry_delay(),
                    },
                );
            }
            Transition::RetryPreempted { abandoned, next } => {
                telemetry::record_preemption(&self.instance_id, abandoned.action.as_str());
                self.publish(
                    format!("preempt-{}-{}", self.run_id, self.attempt),
                    FeatureJobEventPayload::Preempted {
                        abandoned: abandoned.action.clone(),
                        next: next.action.clone(),
                    },
                );
            }
            _ => {}
        }
    }
}
