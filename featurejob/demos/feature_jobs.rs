//! Feature job example on the in-process runtime.
//!
//! This example demonstrates:
//! - Wrapping a registry of synchronous feature managers so that state
//!   changes are dispatched as jobs
//! - One instance per (cluster, feature), with jobs processed in order
//! - Retry of a transient failure after the retry interval
//! - Fail-closed handling of an unsupported action
//!
//! Run with `RUST_LOG=featurejob=debug` to see every state transition.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use featurejob::*;
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Manager that pretends to install a Helm chart, failing the first
/// `flaky_attempts` state changes with a transient error.
struct HelmFeatureManager {
    name: FeatureName,
    flaky_attempts: AtomicU32,
}

impl HelmFeatureManager {
    fn new(name: &str, flaky_attempts: u32) -> Self {
        Self {
            name: FeatureName::new(name),
            flaky_attempts: AtomicU32::new(flaky_attempts),
        }
    }

    async fn apply(&self, cluster_id: ClusterId, verb: &str) -> Result<(), FeatureError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let remaining = self.flaky_attempts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.flaky_attempts.store(remaining - 1, Ordering::SeqCst);
            println!(
                "[{}] {} on cluster {} failed, helm release locked",
                self.name, verb, cluster_id
            );
            return Err(FeatureError::transient(anyhow::anyhow!("helm release locked")));
        }
        println!("[{}] {} on cluster {} done", self.name, verb, cluster_id);
        Ok(())
    }
}

#[async_trait]
impl FeatureManager for HelmFeatureManager {
    fn name(&self) -> &FeatureName {
        &self.name
    }

    fn validate_spec(&self, _spec: &FeatureSpec) -> Result<(), FeatureError> {
        Ok(())
    }

    async fn output(&self, cluster_id: ClusterId) -> Result<FeatureOutput, FeatureError> {
        let mut output = FeatureOutput::new();
        output.insert(
            "release".to_string(),
            json!(format!("{}-{}", self.name, cluster_id)),
        );
        Ok(output)
    }

    async fn activate(
        &self,
        cluster_id: ClusterId,
        _spec: FeatureSpec,
    ) -> Result<(), FeatureError> {
        self.apply(cluster_id, "activate").await
    }

    async fn deactivate(&self, cluster_id: ClusterId) -> Result<(), FeatureError> {
        self.apply(cluster_id, "deactivate").await
    }

    async fn update(&self, cluster_id: ClusterId, _spec: FeatureSpec) -> Result<(), FeatureError> {
        self.apply(cluster_id, "update").await
    }
}

fn spec(value: serde_json::Value) -> FeatureSpec {
    match value {
        serde_json::Value::Object(map) => map,
        _ => FeatureSpec::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("featurejob=info")),
        )
        .init();

    println!("=== Feature Job Example ===\n");

    let registry = FeatureRegistry::new()
        .with_feature(Arc::new(HelmFeatureManager::new("monitoring", 0)))
        .with_feature(Arc::new(HelmFeatureManager::new("logging", 1)));

    let runtime = Arc::new(
        InProcRuntimeBuilder::new(RuntimeConfig::default())
            .with_executor(Arc::new(RegistryActivityExecutor::new(registry.clone())))
            .build()?,
    );
    let mut events = runtime.subscribe();

    let config = DispatcherConfig::default().with_retry_interval(Duration::from_secs(1));
    let features = registry.wrap_async(Arc::clone(&runtime), config);

    let monitoring = features.get(&FeatureName::new("monitoring"))?;
    let logging = features.get(&FeatureName::new("logging"))?;

    println!("1. Queueing monitoring jobs on cluster 42...");
    monitoring.activate(ClusterId(42), spec(json!({ "enabled": true }))).await?;
    monitoring
        .update(ClusterId(42), spec(json!({ "enabled": true, "level": "debug" })))
        .await?;

    println!("2. Activating logging on cluster 42 (first attempt fails)...");
    logging.activate(ClusterId(42), spec(json!({ "retention_days": 7 }))).await?;

    println!("3. Sending an unsupported action to monitoring on cluster 7...");
    runtime
        .signal_with_start(
            &InstanceId::new(
                FEATURE_JOB_WORKFLOW_NAME,
                &FeatureKey::new(ClusterId(7), "monitoring"),
            ),
            FEATURE_JOB_SIGNAL_NAME,
            JobSignal::new(JobAction::from("restart"), None),
            JobInput::new(ClusterId(7), "monitoring"),
        )
        .await?;

    println!("\nWaiting for instances to finish...\n");
    let mut terminated = 0;
    while terminated < 3 {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv()).await??;
        match event.payload {
            FeatureJobEventPayload::RetryScheduled {
                action,
                retry_interval,
            } => {
                println!(
                    "   {} retrying {} in {:?}",
                    event.meta.instance_id, action, retry_interval
                );
            }
            FeatureJobEventPayload::Terminated { outcome, .. } => {
                terminated += 1;
                match outcome {
                    TerminationOutcome::Completed { jobs_completed } => {
                        println!(
                            "   {} completed {} job(s)",
                            event.meta.instance_id, jobs_completed
                        );
                    }
                    TerminationOutcome::Failed { reason, error } => {
                        println!(
                            "   {} failed ({}): {}",
                            event.meta.instance_id, reason, error
                        );
                    }
                    TerminationOutcome::Stopped => {
                        println!("   {} stopped", event.meta.instance_id);
                    }
                }
            }
            _ => {}
        }
    }

    let output = monitoring.output(ClusterId(42)).await?;
    println!("\nMonitoring output: {}", serde_json::Value::Object(output));

    runtime.shutdown().await?;
    println!("\n=== Example Complete ===");
    Ok(())
}
