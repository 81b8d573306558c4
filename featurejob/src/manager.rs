//! Feature managers and the asynchronous dispatcher.
//!
//! A [`FeatureManager`] knows how to provision one feature. Wrapped in an
//! [`AsyncFeatureManager`], its state-changing operations no longer run
//! inline: they become job signals delivered to the orchestrator instance
//! owning the (cluster, feature) key, and return as soon as the runtime has
//! accepted the signal.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::DispatcherConfig;
use crate::error::{DispatchError, FeatureError};
use crate::feature::{ClusterId, FeatureName, FeatureOutput, FeatureSpec};
use crate::runtime::{WorkflowClient, WorkflowExecution};
use crate::signal::{InstanceId, JobAction, JobInput, JobSignal};
use crate::telemetry;

/// Capability set of one installable feature.
#[async_trait]
pub trait FeatureManager: Send + Sync {
    /// Name of the feature this manager handles.
    fn name(&self) -> &FeatureName;

    /// Check a spec without applying it.
    fn validate_spec(&self, spec: &FeatureSpec) -> Result<(), FeatureError>;

    /// Read the current feature state on a cluster.
    async fn output(&self, cluster_id: ClusterId) -> Result<FeatureOutput, FeatureError>;

    /// Deploy and activate the feature on a cluster.
    async fn activate(&self, cluster_id: ClusterId, spec: FeatureSpec) -> Result<(), FeatureError>;

    /// Remove the feature from a cluster.
    async fn deactivate(&self, cluster_id: ClusterId) -> Result<(), FeatureError>;

    /// Apply a new spec to an active feature.
    async fn update(&self, cluster_id: ClusterId, spec: FeatureSpec) -> Result<(), FeatureError>;
}

/// Dispatcher: a [`FeatureManager`] whose state changes are queued as jobs.
///
/// `name`, `validate_spec` and `output` are answered by the wrapped
/// manager. `activate`, `deactivate` and `update` compose a [`JobSignal`]
/// and hand it to [`WorkflowClient::signal_with_start`]; they succeed once
/// the signal is accepted, long before the activity runs. The only error
/// they return is a [`FeatureError::Dispatch`].
pub struct AsyncFeatureManager<M: ?Sized, C: ?Sized> {
    inner: Arc<M>,
    client: Arc<C>,
    config: DispatcherConfig,
}

impl<M, C> fmt::Debug for AsyncFeatureManager<M, C>
where
    M: FeatureManager + ?Sized,
    C: ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFeatureManager")
            .field("feature", self.inner.name())
            .field("config", &self.config)
            .finish()
    }
}

impl<M, C> AsyncFeatureManager<M, C>
where
    M: FeatureManager + ?Sized,
    C: WorkflowClient + ?Sized,
{
    pub fn new(inner: Arc<M>, client: Arc<C>, config: DispatcherConfig) -> Self {
        Self {
            inner,
            client,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// The instance that receives this feature's jobs for `cluster_id`.
    pub fn instance_id(&self, cluster_id: ClusterId) -> InstanceId {
        InstanceId::new(&self.config.workflow_name, &self.job_input(cluster_id).key())
    }

    fn job_input(&self, cluster_id: ClusterId) -> JobInput {
        JobInput::new(cluster_id, self.inner.name().clone())
    }

    /// Deliver one job to the instance owning (`cluster_id`, this feature),
    /// starting the instance if none is live.
    pub async fn dispatch(
        &self,
        cluster_id: ClusterId,
        action: JobAction,
        spec: Option<FeatureSpec>,
    ) -> Result<WorkflowExecution, DispatchError> {
        let input = self.job_input(cluster_id);
        let instance_id = InstanceId::new(&self.config.workflow_name, &input.key());
        let signal =
            JobSignal::new(action.clone(), spec).with_retry_interval(self.config.retry_interval());

        telemetry::instrument_dispatch(
            &instance_id,
            action.as_str(),
            self.client
                .signal_with_start(&instance_id, &self.config.signal_name, signal, input),
        )
        .await
        .map_err(|err| {
            tracing::warn!(
                instance_id = %instance_id,
                action = %action,
                "dispatch failed: {err:#}"
            );
            DispatchError::new(instance_id.clone(), err)
        })
    }
}

#[async_trait]
impl<M, C> FeatureManager for AsyncFeatureManager<M, C>
where
    M: FeatureManager + ?Sized,
    C: WorkflowClient + ?Sized,
{
    fn name(&self) -> &FeatureName {
        self.inner.name()
    }

    fn validate_spec(&self, spec: &FeatureSpec) -> Result<(), FeatureError> {
        self.inner.validate_spec(spec)
    }

    async fn output(&self, cluster_id: ClusterId) -> Result<FeatureOutput, FeatureError> {
        self.inner.output(cluster_id).await
    }

    async fn activate(&self, cluster_id: ClusterId, spec: FeatureSpec) -> Result<(), FeatureError> {
        self.dispatch(cluster_id, JobAction::Activate, Some(spec)).await?;
        Ok(())
    }

    async fn deactivate(&self, cluster_id: ClusterId) -> Result<(), FeatureError> {
        self.dispatch(cluster_id, JobAction::Deactivate, None).await?;
        Ok(())
    }

    async fn update(&self, cluster_id: ClusterId, spec: FeatureSpec) -> Result<(), FeatureError> {
        self.dispatch(cluster_id, JobAction::Update, Some(spec)).await?;
        Ok(())
    }
}
