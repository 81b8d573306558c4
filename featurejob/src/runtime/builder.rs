use std::fmt;
use std::sync::Arc;

use crate::activity::ActivityExecutor;
use crate::config::RuntimeConfig;
use crate::events::{InProcEventBus, JobEventPublisher};

use super::inproc::InProcRuntime;

/// Builder for constructing an [`InProcRuntime`] with explicit dependencies.
///
/// The executor is required. When no event publisher is supplied an
/// [`InProcEventBus`] sized by `RuntimeConfig::event_capacity` is used.
///
/// # Example
///
/// ```ignore
/// use featurejob::*;
///
/// let runtime = InProcRuntimeBuilder::new(RuntimeConfig::default())
///     .with_executor(Arc::new(RegistryActivityExecutor::new(registry)))
///     .build()?;
/// ```
pub struct InProcRuntimeBuilder {
    config: RuntimeConfig,
    executor: Option<Arc<dyn ActivityExecutor>>,
    events: Option<Arc<dyn JobEventPublisher>>,
}

impl fmt::Debug for InProcRuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcRuntimeBuilder")
            .field("config", &self.config)
            .field("executor_set", &self.executor.is_some())
            .field("events_set", &self.events.is_some())
            .finish()
    }
}

impl Default for InProcRuntimeBuilder {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl InProcRuntimeBuilder {
    /// Create a new builder with the given runtime configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            executor: None,
            events: None,
        }
    }

    /// Replace the runtime configuration.
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the activity executor shared by all instances.
    pub fn with_executor(mut self, executor: Arc<dyn ActivityExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the event publisher.
    pub fn with_events(mut self, events: Arc<dyn JobEventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if no executor was provided.
    pub fn build(self) -> anyhow::Result<InProcRuntime> {
        let executor = self
            .executor
            .ok_or_else(|| anyhow::anyhow!("executor dependency missing"))?;
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(InProcEventBus::new(self.config.event_capacity)));

        Ok(InProcRuntime::new(self.config, executor, events))
    }
}
