//! Dispatcher tests: how `AsyncFeatureManager` composes and delivers job
//! signals, against a client that only records.

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use featurejob::*;
use featurejob_testkit::fixtures::{monitoring_spec, spec};
use featurejob_testkit::{RecordingClient, StaticFeatureManager};
use serde_json::json;

fn dispatcher(
    manager: StaticFeatureManager,
    config: DispatcherConfig,
) -> (AsyncFeatureManager<StaticFeatureManager, RecordingClient>, RecordingClient) {
    let client = RecordingClient::new();
    let dispatcher = AsyncFeatureManager::new(Arc::new(manager), Arc::new(client.clone()), config);
    (dispatcher, client)
}

#[tokio::test]
async fn activate_delivers_a_signal_with_start() {
    let (dispatcher, client) =
        dispatcher(StaticFeatureManager::new("dns"), DispatcherConfig::default());

    dispatcher.activate(ClusterId(7), monitoring_spec()).await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.instance_id.as_str(), "cluster-feature-job-7-dns");
    assert_eq!(call.signal_name, FEATURE_JOB_SIGNAL_NAME);
    assert_eq!(call.signal.action, JobAction::Activate);
    assert_eq!(call.signal.spec, Some(monitoring_spec()));
    assert_eq!(call.signal.retry_interval, Duration::from_secs(60));
    assert_eq!(call.input, JobInput::new(ClusterId(7), "dns"));
}

#[tokio::test]
async fn deactivate_and_update_compose_their_actions() {
    let (dispatcher, client) =
        dispatcher(StaticFeatureManager::new("dns"), DispatcherConfig::default());
    let new_spec = spec(json!({ "provider": "route53" }));

    dispatcher.deactivate(ClusterId(7)).await.unwrap();
    dispatcher.update(ClusterId(7), new_spec.clone()).await.unwrap();

    let calls = client.calls();
    assert_eq!(calls[0].signal, JobSignal::deactivate());
    assert_eq!(calls[1].signal, JobSignal::update(new_spec));
    assert!(calls.iter().all(|c| c.instance_id == calls[0].instance_id));
}

#[tokio::test]
async fn dispatch_reports_whether_a_run_was_created() {
    let (dispatcher, _client) =
        dispatcher(StaticFeatureManager::new("dns"), DispatcherConfig::default());

    let first = dispatcher
        .dispatch(ClusterId(3), JobAction::Deactivate, None)
        .await
        .unwrap();
    let second = dispatcher
        .dispatch(ClusterId(3), JobAction::Deactivate, None)
        .await
        .unwrap();
    let other_cluster = dispatcher
        .dispatch(ClusterId(4), JobAction::Deactivate, None)
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.run_id, second.run_id);
    assert!(other_cluster.created);
}

#[tokio::test]
async fn config_controls_identity_channel_and_retry_interval() {
    let config = DispatcherConfig::default()
        .with_workflow_name("job")
        .with_signal_name("feature-job")
        .with_retry_interval(Duration::from_secs(15));
    let (dispatcher, client) = dispatcher(StaticFeatureManager::new("monitoring"), config);

    assert_eq!(dispatcher.instance_id(ClusterId(42)).as_str(), "job-42-monitoring");
    dispatcher.deactivate(ClusterId(42)).await.unwrap();

    let call = &client.calls()[0];
    assert_eq!(call.signal_name, "feature-job");
    assert_eq!(call.signal.retry_interval, Duration::from_secs(15));
}

#[tokio::test]
async fn dispatch_does_not_validate_specs() {
    let manager = StaticFeatureManager::new("monitoring").with_required_key("level");
    let (dispatcher, client) = dispatcher(manager, DispatcherConfig::default());

    assert!(matches!(
        dispatcher.validate_spec(&monitoring_spec()),
        Err(FeatureError::InvalidSpec { .. })
    ));
    dispatcher.activate(ClusterId(1), monitoring_spec()).await.unwrap();
    client.assert_call_count_eq(1);
}

#[tokio::test]
async fn read_operations_are_answered_by_the_wrapped_manager() {
    let output = spec(json!({ "grafana": { "url": "https://grafana.example" } }));
    let manager = StaticFeatureManager::new("monitoring").with_output(output.clone());
    let inner = manager.clone();
    let (dispatcher, client) = dispatcher(manager, DispatcherConfig::default());

    assert_eq!(dispatcher.name().as_str(), "monitoring");
    assert_eq!(dispatcher.output(ClusterId(9)).await.unwrap(), output);
    assert!(dispatcher.validate_spec(&FeatureSpec::new()).is_ok());

    client.assert_call_count_eq(0);
    inner.assert_call_count_eq(0);
}

#[tokio::test]
async fn client_failure_surfaces_as_dispatch_error() {
    let (dispatcher, client) =
        dispatcher(StaticFeatureManager::new("logging"), DispatcherConfig::default());
    client.fail_with("frontend unavailable");

    let err = dispatcher.deactivate(ClusterId(5)).await.unwrap_err();

    match &err {
        FeatureError::Dispatch(dispatch) => {
            assert_eq!(dispatch.instance_id.as_str(), "cluster-feature-job-5-logging");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.to_string(),
        "signal with start failed: instance_id=cluster-feature-job-5-logging"
    );
    let cause = err.source().map(|s| s.to_string()).unwrap_or_default();
    assert_eq!(cause, "frontend unavailable");

    client.recover();
    dispatcher.deactivate(ClusterId(5)).await.unwrap();
    client.assert_call_count_eq(1);
}
