use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::runtime::RunId;
use crate::signal::{InstanceId, JobAction};

/// Metadata envelope attached to every feature job event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: u16,
    /// Run the event belongs to. Dispatch events carry the run they joined.
    pub correlation_id: Uuid,
    pub idempotency_key: String,
    pub instance_id: InstanceId,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(
        instance_id: InstanceId,
        correlation_id: Option<Uuid>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            version: 1,
            correlation_id: correlation_id.unwrap_or_else(Uuid::now_v7),
            idempotency_key: idempotency_key.into(),
            instance_id,
            timestamp: Utc::now(),
        }
    }

    /// Metadata for an event emitted by `run_id`.
    pub fn for_run(
        instance_id: &InstanceId,
        run_id: RunId,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self::new(instance_id.clone(), Some(run_id.as_uuid()), idempotency_key)
    }
}

/// Lifecycle event of an orchestrator instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureJobEvent {
    pub meta: EventMeta,
    pub payload: FeatureJobEventPayload,
}

impl FeatureJobEvent {
    pub fn new(meta: EventMeta, payload: FeatureJobEventPayload) -> Self {
        Self { meta, payload }
    }
}

/// How an instance run ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminationOutcome {
    /// The inbox drained after the last job succeeded.
    Completed { jobs_completed: u32 },
    /// A job failed for good. `reason` is the [`crate::JobError::label`].
    Failed { reason: String, error: String },
    /// The runtime shut down while the run was still live.
    Stopped,
}

impl TerminationOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            TerminationOutcome::Completed { .. } => "completed",
            TerminationOutcome::Failed { .. } => "failed",
            TerminationOutcome::Stopped => "stopped",
        }
    }
}

/// Event payload emitted for instance lifecycle transitions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum FeatureJobEventPayload {
    /// A signal was delivered, to a new run when `created` is set.
    Dispatched { action: JobAction, created: bool },
    /// A new run of the instance started.
    InstanceStarted { run_id: RunId },
    /// An activity attempt started.
    ActivityStarted { activity: String, attempt: u32 },
    /// An activity attempt succeeded.
    ActivitySucceeded { activity: String, attempt: u32 },
    /// An activity attempt failed.
    ActivityFailed {
        activity: String,
        attempt: u32,
        retryable: bool,
        error: String,
    },
    /// A retry wait started.
    RetryScheduled {
        action: JobAction,
        #[serde(with = "crate::signal::duration_ms", rename = "retry_interval_ms")]
        retry_interval: Duration,
    },
    /// A pending retry was abandoned in favour of a newer job.
    Preempted { abandoned: JobAction, next: JobAction },
    /// The run ended.
    Terminated {
        run_id: RunId,
        outcome: TerminationOutcome,
    },
}

/// Sink for instance lifecycle events.
///
/// Publishing is synchronous and must not block; the in-process runtime
/// publishes from inside instance tasks.
pub trait JobEventPublisher: Send + Sync {
    /// Publish an event to all subscribers.
    fn publish(&self, event: FeatureJobEvent) -> anyhow::Result<()>;
    /// Subscribe to events published after this call.
    fn subscribe(&self) -> broadcast::Receiver<FeatureJobEvent>;
}

/// In-process event bus using a tokio broadcast channel.
///
/// Publishers never wait for slow subscribers. A subscriber that falls
/// more than `capacity` events behind receives `RecvError::Lagged`.
pub struct InProcEventBus {
    sender: broadcast::Sender<FeatureJobEvent>,
    capacity: usize,
}

impl std::fmt::Debug for InProcEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcEventBus {
    /// Create a bus buffering at most `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl JobEventPublisher for InProcEventBus {
    fn publish(&self, event: FeatureJobEvent) -> anyhow::Result<()> {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<FeatureJobEvent> {
        self.sender.subscribe()
    }
}
