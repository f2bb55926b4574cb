// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sb_client::test_support::FakeInvoker;
use sb_core::test_support::{step, workflow};
use sb_core::{CollectingObserver, StepState};
use serde_json::json;

fn engine_with(invoker: FakeInvoker, config: EngineConfig) -> Arc<WorkflowEngine<FakeInvoker>> {
    Arc::new(WorkflowEngine::new(Arc::new(invoker), Observers::new(), config))
}

fn one_step_workflow(name: &str) -> WorkflowDef {
    workflow(name, vec![step("only", &[])])
}

#[tokio::test]
async fn execute_unknown_workflow_is_not_found() {
    let engine = engine_with(FakeInvoker::new(), EngineConfig::default());
    let err = engine.execute_workflow("ghost", json!({}), HashMap::new()).await.unwrap_err();
    assert_eq!(err, OrchestratorError::NotFound("workflow 'ghost'".into()));
}

#[tokio::test]
async fn register_rejects_invalid_definitions() {
    let engine = engine_with(FakeInvoker::new(), EngineConfig::default());
    let bad = workflow("cyclic", vec![step("a", &["b"]), step("b", &["a"])]);
    assert!(matches!(
        engine.register_workflow(bad),
        Err(OrchestratorError::Validation(_))
    ));
    assert!(engine.list_workflows().is_empty());
}

#[tokio::test]
async fn reregistering_replaces_the_definition() {
    let invoker = FakeInvoker::new();
    let engine = engine_with(invoker.clone(), EngineConfig::default());

    engine.register_workflow(one_step_workflow("w")).unwrap();
    let mut v2 = workflow("w", vec![step("renamed", &[])]);
    v2.version = "2.0.0".to_string();
    engine.register_workflow(v2).unwrap();

    assert_eq!(engine.list_workflows().len(), 1);
    let run = engine.execute_workflow("w", json!({}), HashMap::new()).await.unwrap();
    // The new definition's step ran.
    assert!(run.step("renamed").is_some());
    assert!(run.step("only").is_none());
}

#[tokio::test]
async fn execute_returns_terminal_run_and_moves_it_to_history() {
    let engine = engine_with(FakeInvoker::new(), EngineConfig::default());
    engine.register_workflow(one_step_workflow("w")).unwrap();

    let run = engine.execute_workflow("w", json!({"k": 1}), HashMap::new()).await.unwrap();
    assert_eq!(run.state, WorkflowState::Completed);
    assert_eq!(run.input, json!({"k": 1}));
    assert!(run.finished_at_ms.is_some());

    // No longer active, still readable.
    assert!(engine.list_active_executions().is_empty());
    let status = engine.get_workflow_status(run.id.as_str()).unwrap();
    assert_eq!(status.state, WorkflowState::Completed);
}

#[tokio::test(start_paused = true)]
async fn admission_limit_rejects_with_overloaded() {
    let invoker = FakeInvoker::new().with_delay(Duration::from_millis(200));
    let engine = engine_with(invoker, EngineConfig {
        max_concurrent_workflows: 2,
        ..EngineConfig::default()
    });
    engine.register_workflow(one_step_workflow("w")).unwrap();

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.execute_workflow("w", json!({}), HashMap::new()).await }
    });
    let second = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.execute_workflow("w", json!({}), HashMap::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Both slots taken: the third admission fails.
    let err = engine.execute_workflow("w", json!({}), HashMap::new()).await.unwrap_err();
    assert_eq!(err, OrchestratorError::Overloaded(2));

    // A finished run frees its slot.
    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert!(engine.execute_workflow("w", json!({}), HashMap::new()).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn cancel_workflow_reaches_the_run() {
    let invoker = FakeInvoker::new().with_delay(Duration::from_secs(60));
    let engine = engine_with(invoker, EngineConfig::default());
    engine.register_workflow(one_step_workflow("w")).unwrap();

    let task = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.execute_workflow("w", json!({}), HashMap::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let active = engine.list_active_executions();
    assert_eq!(active.len(), 1);
    engine.cancel_workflow(active[0].id.as_str(), "operator").unwrap();

    let run = task.await.unwrap().unwrap();
    assert_eq!(run.state, WorkflowState::Cancelled);
    assert_eq!(run.cancel_reason.as_deref(), Some("operator"));
}

#[tokio::test]
async fn cancel_unknown_run_is_not_found() {
    let engine = engine_with(FakeInvoker::new(), EngineConfig::default());
    assert!(matches!(
        engine.cancel_workflow("wfr-nope", "x"),
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn metrics_count_outcomes() {
    let invoker = FakeInvoker::new();
    invoker.respond("svc", "run", Err(OrchestratorError::Http5xx(500)));
    let engine = engine_with(invoker, EngineConfig::default());
    engine.register_workflow(one_step_workflow("w")).unwrap();

    // First run fails (scripted error), second completes.
    let failed = engine.execute_workflow("w", json!({}), HashMap::new()).await.unwrap();
    assert_eq!(failed.state, WorkflowState::Failed);
    let ok = engine.execute_workflow("w", json!({}), HashMap::new()).await.unwrap();
    assert_eq!(ok.state, WorkflowState::Completed);

    let metrics = engine.get_metrics();
    assert_eq!(metrics.started, 2);
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.failed, 1);
    assert_eq!(metrics.active, 0);
    assert_eq!(metrics.registered_workflows, 1);
}

#[tokio::test]
async fn history_prunes_by_retention() {
    let engine = engine_with(FakeInvoker::new(), EngineConfig {
        history_retention: Duration::from_millis(0),
        ..EngineConfig::default()
    });
    engine.register_workflow(one_step_workflow("w")).unwrap();

    let run = engine.execute_workflow("w", json!({}), HashMap::new()).await.unwrap();
    // Zero retention: the run is pruned as soon as history is read.
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(engine.get_workflow_status(run.id.as_str()).is_none());
}

#[tokio::test(start_paused = true)]
async fn heartbeat_reports_activity() {
    let engine = engine_with(FakeInvoker::new(), EngineConfig {
        heartbeat_interval: Duration::from_millis(100),
        ..EngineConfig::default()
    });
    let sink = CollectingObserver::new();
    engine.observers().subscribe(Arc::new(sink.clone()));

    let task = engine.spawn_heartbeat();
    tokio::time::sleep(Duration::from_millis(250)).await;
    task.abort();

    let beats = sink.names().iter().filter(|n| **n == "heartbeat").count();
    assert!(beats >= 2, "got {beats}");
}

#[tokio::test]
async fn input_flows_into_step_params() {
    let invoker = FakeInvoker::new();
    let engine = engine_with(invoker.clone(), EngineConfig::default());
    let mut greeting = step("greet", &[]);
    greeting.params = json!({"to": "${input.name}"});
    engine.register_workflow(workflow("w", vec![greeting])).unwrap();

    let run = engine
        .execute_workflow("w", json!({"name": "ada"}), HashMap::new())
        .await
        .unwrap();
    assert_eq!(run.state, WorkflowState::Completed);
    assert_eq!(invoker.calls()[0].args, json!({"to": "ada"}));
    assert_eq!(run.step("greet").unwrap().state, StepState::Completed);
}

#[tokio::test]
async fn metadata_is_carried_through() {
    let engine = engine_with(FakeInvoker::new(), EngineConfig::default());
    engine.register_workflow(one_step_workflow("w")).unwrap();

    let mut metadata = HashMap::new();
    metadata.insert("requested_by".to_string(), json!("gateway"));
    let run = engine.execute_workflow("w", json!({}), metadata).await.unwrap();
    assert_eq!(run.metadata.get("requested_by"), Some(&json!("gateway")));
}
