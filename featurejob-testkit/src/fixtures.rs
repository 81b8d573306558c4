use featurejob::*;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::broadcast;

/// Convert a JSON object literal into a [`FeatureSpec`]. Non-objects yield an empty spec.
pub fn spec(value: Value) -> FeatureSpec {
    match value {
        Value::Object(map) => map,
        _ => FeatureSpec::new(),
    }
}

/// `{"enabled": true}`
pub fn monitoring_spec() -> FeatureSpec {
    spec(json!({ "enabled": true }))
}

/// `{"enabled": true, "level": "debug"}`
pub fn monitoring_debug_spec() -> FeatureSpec {
    spec(json!({ "enabled": true, "level": "debug" }))
}

/// Cluster 42, feature `monitoring`.
pub fn monitoring_key() -> FeatureKey {
    FeatureKey::new(ClusterId(42), "monitoring")
}

/// Dispatcher config producing instance ids of the form `job-{cluster}-{feature}`.
pub fn job_dispatcher_config() -> DispatcherConfig {
    DispatcherConfig::default().with_workflow_name("job")
}

/// Wait for the next `Terminated` event, skipping everything else.
///
/// Panics if nothing terminates within `within`, or if the bus lags or closes.
pub async fn next_terminated(
    events: &mut broadcast::Receiver<FeatureJobEvent>,
    within: Duration,
) -> (InstanceId, TerminationOutcome) {
    let wait = async {
        loop {
            let event = events.recv().await.expect("event bus closed or lagged");
            if let FeatureJobEventPayload::Terminated { outcome, .. } = event.payload {
                return (event.meta.instance_id, outcome);
            }
        }
    };
    tokio::time::timeout(within, wait)
        .await
        .expect("no instance terminated in time")
}

/// Drain every event already buffered on `events`.
pub fn drain_events(
    events: &mut broadcast::Receiver<FeatureJobEvent>,
) -> Vec<FeatureJobEventPayload> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event.payload);
    }
    drained
}
