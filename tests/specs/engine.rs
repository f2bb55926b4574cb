// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow engine scenarios.

use super::prelude::*;

#[tokio::test]
async fn linear_workflow_completes_in_order() {
    let invoker = FakeInvoker::new();
    invoker.respond("svc", "a", Ok(json!({"ok": true})));
    invoker.respond("svc", "b", Ok(json!({"ok": true})));
    let (engine, _sink) = engine(invoker, EngineConfig::default());
    engine
        .register_workflow(workflow("linear", vec![named_step("a", &[]), named_step("b", &["a"])]))
        .unwrap();

    let run = engine.execute_workflow("linear", json!({}), HashMap::new()).await.unwrap();

    assert_eq!(run.state, WorkflowState::Completed);
    assert_eq!(run.step("a").unwrap().result, Some(json!({"ok": true})));
    assert_eq!(run.step("b").unwrap().result, Some(json!({"ok": true})));
}

#[tokio::test(start_paused = true)]
async fn fan_out_joins_after_all_parallel_steps() {
    let invoker = FakeInvoker::new().with_delay(Duration::from_millis(50));
    let (engine, _sink) = engine(invoker.clone(), EngineConfig::default());
    engine
        .register_workflow(workflow(
            "fanout",
            vec![
                named_step("p1", &[]),
                named_step("p2", &[]),
                named_step("p3", &[]),
                named_step("q", &["p1", "p2", "p3"]),
            ],
        ))
        .unwrap();

    let started = tokio::time::Instant::now();
    let run = engine.execute_workflow("fanout", json!({}), HashMap::new()).await.unwrap();

    assert_eq!(run.state, WorkflowState::Completed);
    // The three parallel steps overlapped: two waves, not four.
    assert_eq!(started.elapsed(), Duration::from_millis(100));
    assert_eq!(invoker.call_keys().last().map(String::as_str), Some("svc/q"));
}

#[tokio::test]
async fn step_retries_then_succeeds() {
    let invoker = FakeInvoker::new();
    invoker.respond("svc", "flaky", Err(OrchestratorError::NetworkUnavailable("down".into())));
    invoker.respond("svc", "flaky", Err(OrchestratorError::NetworkUnavailable("down".into())));
    invoker.respond("svc", "flaky", Ok(json!({"v": 7})));
    let (engine, _sink) = engine(invoker.clone(), EngineConfig::default());
    let mut flaky = named_step("flaky", &[]);
    flaky.retries = 2;
    engine.register_workflow(workflow("retrying", vec![flaky])).unwrap();

    let run = engine.execute_workflow("retrying", json!({}), HashMap::new()).await.unwrap();

    assert_eq!(run.state, WorkflowState::Completed);
    assert_eq!(run.step("flaky").unwrap().attempt, 3);
    assert_eq!(run.step("flaky").unwrap().result, Some(json!({"v": 7})));
    assert_eq!(invoker.calls().len(), 3);
}

#[tokio::test]
async fn saga_compensates_completed_steps() {
    let invoker = FakeInvoker::new();
    invoker.respond("users", "create_user", Ok(json!({"id": "u1"})));
    invoker.respond_times(
        "mailer",
        "send_welcome",
        1,
        Err(OrchestratorError::Remote { code: -1, message: "smtp down".into() }),
    );
    invoker.respond("users", "delete_user", Ok(json!({})));

    let mut create = named_step("create_user", &[]);
    create.mcp = "users".to_string();
    create.compensation = Some(sb_core::CompensationDef {
        mcp: None,
        action: "delete_user".to_string(),
        params: json!({"id": "${steps.create_user.result.id}"}),
    });
    let mut send = named_step("send_welcome", &["create_user"]);
    send.mcp = "mailer".to_string();

    let (engine, sink) = engine(invoker.clone(), EngineConfig::default());
    engine.register_workflow(workflow("onboard", vec![create, send])).unwrap();

    let run = engine.execute_workflow("onboard", json!({}), HashMap::new()).await.unwrap();

    assert_eq!(run.state, WorkflowState::Compensated);
    assert_eq!(run.step("create_user").unwrap().state, StepState::Compensated);
    assert_eq!(
        invoker.call_keys(),
        vec!["users/create_user", "mailer/send_welcome", "users/delete_user"]
    );
    assert_eq!(invoker.calls()[2].args, json!({"id": "u1"}));
    let names = sink.names();
    assert!(names.contains(&"workflow:compensation_started"));
    assert_eq!(names.last(), Some(&"workflow:compensated"));
}

#[tokio::test]
async fn deadlock_is_detected_and_reported() {
    let invoker = FakeInvoker::new();
    let (engine, _sink) = engine(invoker, EngineConfig::default());
    let mut gate = named_step("gate", &[]);
    gate.condition = Some("${input.go} == true".to_string());
    engine
        .register_workflow(workflow("blocked", vec![gate, named_step("after", &["gate"])]))
        .unwrap();

    let run = engine
        .execute_workflow("blocked", json!({"go": false}), HashMap::new())
        .await
        .unwrap();

    assert_eq!(run.state, WorkflowState::Failed);
    let error = run.error.unwrap_or_default();
    assert!(error.contains("deadlock") && error.contains("after"), "got {error}");
}

#[tokio::test(start_paused = true)]
async fn admission_boundary_is_exact() {
    let invoker = FakeInvoker::new().with_delay(Duration::from_millis(100));
    let (engine, _sink) = engine(invoker, EngineConfig {
        max_concurrent_workflows: 3,
        ..EngineConfig::default()
    });
    engine.register_workflow(workflow("w", vec![named_step("s", &[])])).unwrap();

    let mut running = Vec::new();
    for _ in 0..3 {
        let engine = Arc::clone(&engine);
        running.push(tokio::spawn(async move {
            engine.execute_workflow("w", json!({}), HashMap::new()).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The (N+1)th admission fails while N are active.
    let err = engine.execute_workflow("w", json!({}), HashMap::new()).await.unwrap_err();
    assert_eq!(err, OrchestratorError::Overloaded(3));

    for task in running {
        assert!(task.await.unwrap().is_ok());
    }
    // Completion freed the slots.
    assert!(engine.execute_workflow("w", json!({}), HashMap::new()).await.is_ok());
}

#[tokio::test]
async fn events_arrive_in_transition_order() {
    let invoker = FakeInvoker::new();
    let (engine, sink) = engine(invoker, EngineConfig::default());
    engine
        .register_workflow(workflow("two", vec![named_step("a", &[]), named_step("b", &["a"])]))
        .unwrap();

    engine.execute_workflow("two", json!({}), HashMap::new()).await.unwrap();

    assert_eq!(
        sink.names(),
        vec![
            "workflow:started",
            "step:started",
            "step:completed",
            "step:started",
            "step:completed",
            "workflow:completed",
        ]
    );
}
