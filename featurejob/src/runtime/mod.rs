/// Builder for the in-process runtime.
pub mod builder;
/// Create-or-signal contract used by the dispatcher.
pub mod client;
/// Per-instance capabilities consumed by the state machine.
pub mod context;
/// Non-durable runtime hosting instances as tokio tasks.
pub mod inproc;

pub use builder::InProcRuntimeBuilder;
pub use client::{RunId, WorkflowClient, WorkflowExecution};
pub use context::{RetryWake, WorkflowContext};
pub use inproc::{InProcRuntime, ShutdownToken};
