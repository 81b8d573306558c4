//! End-to-end wiring: a registry of synchronous managers, wrapped so that
//! state changes go through the in-process runtime, with the same registry
//! executing the activities.

use std::sync::Arc;
use std::time::Duration;

use featurejob::*;
use featurejob_testkit::fixtures::{job_dispatcher_config, monitoring_spec, next_terminated, spec};
use featurejob_testkit::{ManagerCall, ManagerFailure, StaticFeatureManager};
use serde_json::json;
use tokio::time::Instant;

const WAIT: Duration = Duration::from_secs(3600);

struct Wiring {
    runtime: Arc<InProcRuntime>,
    monitoring: StaticFeatureManager,
    dispatching: FeatureRegistry,
}

fn wiring() -> Wiring {
    let monitoring = StaticFeatureManager::new("monitoring")
        .with_output(spec(json!({ "dashboard": "https://grafana.example/d/42" })));
    let registry = FeatureRegistry::new()
        .with_feature(Arc::new(monitoring.clone()))
        .with_feature(Arc::new(StaticFeatureManager::new("logging")));

    let runtime = Arc::new(
        InProcRuntimeBuilder::new(RuntimeConfig::default())
            .with_executor(Arc::new(RegistryActivityExecutor::new(registry.clone())))
            .build()
            .expect("runtime builds"),
    );
    let dispatching = registry.wrap_async(Arc::clone(&runtime), job_dispatcher_config());

    Wiring {
        runtime,
        monitoring,
        dispatching,
    }
}

#[tokio::test(start_paused = true)]
async fn activate_reaches_the_registered_manager() {
    let w = wiring();
    let mut events = w.runtime.subscribe();

    let manager = w.dispatching.get(&FeatureName::new("monitoring")).unwrap();
    manager.activate(ClusterId(42), monitoring_spec()).await.unwrap();

    let (instance, outcome) = next_terminated(&mut events, WAIT).await;
    assert_eq!(instance.as_str(), "job-42-monitoring");
    assert_eq!(outcome, TerminationOutcome::Completed { jobs_completed: 1 });
    assert_eq!(
        w.monitoring.calls(),
        vec![ManagerCall::Activate {
            cluster_id: ClusterId(42),
            spec: monitoring_spec(),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn transient_manager_failure_is_retried_after_the_interval() {
    let w = wiring();
    let mut events = w.runtime.subscribe();
    w.monitoring
        .fail_next(ManagerFailure::Transient("helm release locked".into()));

    let started = Instant::now();
    w.dispatching
        .get(&FeatureName::new("monitoring"))
        .unwrap()
        .deactivate(ClusterId(42))
        .await
        .unwrap();

    let (_, outcome) = next_terminated(&mut events, WAIT).await;
    assert_eq!(outcome, TerminationOutcome::Completed { jobs_completed: 1 });
    assert!(started.elapsed() >= DEFAULT_RETRY_INTERVAL);
    w.monitoring.assert_call_count_eq(2);
}

#[tokio::test(start_paused = true)]
async fn invalid_spec_from_the_manager_fails_the_run() {
    let w = wiring();
    let mut events = w.runtime.subscribe();
    w.monitoring
        .fail_next(ManagerFailure::InvalidSpec("level must be a string".into()));

    w.dispatching
        .get(&FeatureName::new("monitoring"))
        .unwrap()
        .update(ClusterId(42), monitoring_spec())
        .await
        .unwrap();

    let (_, outcome) = next_terminated(&mut events, WAIT).await;
    match outcome {
        TerminationOutcome::Failed { reason, .. } => assert_eq!(reason, "fatal"),
        other => panic!("expected failure, got {other:?}"),
    }
    w.monitoring.assert_call_count_eq(1);
}

#[tokio::test(start_paused = true)]
async fn unknown_feature_is_fatal_in_the_executor() {
    let w = wiring();
    let mut events = w.runtime.subscribe();
    let unregistered = AsyncFeatureManager::new(
        Arc::new(StaticFeatureManager::new("mesh")),
        Arc::clone(&w.runtime),
        job_dispatcher_config(),
    );

    unregistered.deactivate(ClusterId(5)).await.unwrap();

    let (instance, outcome) = next_terminated(&mut events, WAIT).await;
    assert_eq!(instance.as_str(), "job-5-mesh");
    match outcome {
        TerminationOutcome::Failed { reason, error } => {
            assert_eq!(reason, "fatal");
            assert!(error.contains("mesh"), "unexpected error: {error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn reads_bypass_the_runtime() {
    let w = wiring();

    let manager = w.dispatching.get(&FeatureName::new("monitoring")).unwrap();
    let output = manager.output(ClusterId(42)).await.unwrap();

    assert_eq!(output["dashboard"], "https://grafana.example/d/42");
    assert!(w.runtime.live_instances().is_empty());
    assert_eq!(
        w.dispatching.names(),
        vec![FeatureName::new("logging"), FeatureName::new("monitoring")]
    );
}

#[tokio::test(start_paused = true)]
async fn features_on_one_cluster_run_as_separate_instances() {
    let w = wiring();
    let mut events = w.runtime.subscribe();

    for name in ["monitoring", "logging"] {
        w.dispatching
            .get(&FeatureName::new(name))
            .unwrap()
            .deactivate(ClusterId(42))
            .await
            .unwrap();
    }

    let mut finished = vec![
        next_terminated(&mut events, WAIT).await.0,
        next_terminated(&mut events, WAIT).await.0,
    ];
    finished.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(finished[0].as_str(), "job-42-logging");
    assert_eq!(finished[1].as_str(), "job-42-monitoring");
}
