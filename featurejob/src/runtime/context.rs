use std::time::Duration;

use async_trait::async_trait;

use crate::activity::ActivityInput;
use crate::error::{ActivityError, InboxError};
use crate::orchestrator::Transition;
use crate::signal::JobSignal;

/// How a retry wait ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryWake {
    /// The retry timer fired before any new job arrived.
    TimerFired,
    /// A new job arrived first. The pending timer is cancelled.
    Signal(JobSignal),
}

/// Capabilities an orchestrator instance needs from the runtime hosting it.
///
/// The three async methods are the only suspension points of an instance.
/// Everything the orchestrator does between them is deterministic, which
/// lets a durable runtime rebuild the instance by replaying its recorded
/// signal and activity history.
#[async_trait]
pub trait WorkflowContext: Send {
    /// Block until the first job arrives on the inbox.
    async fn receive_signal(&mut self) -> Result<JobSignal, InboxError>;

    /// Take the next queued job without waiting.
    fn try_receive_signal(&mut self) -> Option<JobSignal>;

    /// Run an activity to completion. The runtime may retry delivery
    /// transparently, so the call is at-least-once.
    async fn execute_activity(&mut self, input: &ActivityInput) -> Result<(), ActivityError>;

    /// Race a cancelable timer of `interval` against the next inbox arrival.
    async fn wait_for_retry(&mut self, interval: Duration) -> RetryWake;

    /// Observe a state machine transition. Must not suspend or fail.
    fn observe(&mut self, _transition: &Transition) {}
}
