use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use crate::signal::{InstanceId, JobInput, JobSignal};

/// Identifier of one run of an instance. A new run starts whenever a
/// dispatch finds no live instance for its key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The run a signal was delivered to.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub instance_id: InstanceId,
    pub run_id: RunId,
    /// `true` when this call started the run, `false` when it joined a live one.
    pub created: bool,
}

/// Registry and execution API of the runtime, as seen by the dispatcher.
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Start the instance if no run is live, then deliver `signal` to it.
    ///
    /// Both steps happen atomically: concurrent callers for the same
    /// instance id end up on one run and no signal is lost.
    async fn signal_with_start(
        &self,
        instance_id: &InstanceId,
        signal_name: &str,
        signal: JobSignal,
        input: JobInput,
    ) -> anyhow::Result<WorkflowExecution>;
}
