// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{FakeFactory, FakeInvoker};
use sb_core::test_support::http_descriptor;
use sb_core::{BreakerConfig, FakeClock, SystemClock, Transport as TransportKind};
use serde_json::json;

fn fake_client(factory: Arc<FakeFactory>, retries: u32) -> McpClient<FakeClock> {
    let mut endpoint =
        sb_core::Endpoint::new(TransportKind::Http { url: "http://unused".into() });
    endpoint.max_retries = retries;
    endpoint.timeout_ms = 1_000;
    McpClient::with_factory(
        "svc",
        endpoint,
        factory,
        BreakerConfig { failure_threshold: 100, ..BreakerConfig::default() },
        PoolConfig { min_size: 0, ..PoolConfig::default() },
        Observers::new(),
        FakeClock::new(),
    )
}

#[tokio::test]
async fn call_tool_sends_tools_call_envelope() {
    let factory = Arc::new(FakeFactory::new());
    factory.push_response(Ok(json!({"ok": true})));
    let client = fake_client(Arc::clone(&factory), 0);

    let result = client.call_tool("create_user", json!({"email": "a@b.c"})).await.unwrap();
    assert_eq!(result, json!({"ok": true}));

    let sent = factory.all_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, "tools/call");
    assert_eq!(sent[0].params.as_ref().unwrap()["name"], "create_user");
}

#[tokio::test(start_paused = true)]
async fn retryable_errors_are_retried_until_success() {
    let factory = Arc::new(FakeFactory::new());
    factory.push_response(Err(OrchestratorError::NetworkUnavailable("down".into())));
    factory.push_response(Err(OrchestratorError::NetworkUnavailable("down".into())));
    factory.push_response(Ok(json!({"v": 7})));
    let client = fake_client(Arc::clone(&factory), 2);

    let result = client.call_tool("t", json!({})).await.unwrap();
    assert_eq!(result, json!({"v": 7}));
    assert_eq!(factory.all_sent().len(), 3);
    assert_eq!(client.metrics().retries, 2);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_exhausted() {
    let factory = Arc::new(FakeFactory::new());
    for _ in 0..4 {
        factory.push_response(Err(OrchestratorError::Http5xx(502)));
    }
    let client = fake_client(Arc::clone(&factory), 3);

    let err = client.call_tool("t", json!({})).await.unwrap_err();
    assert_eq!(err, OrchestratorError::Http5xx(502));
    // 1 initial + 3 retries.
    assert_eq!(factory.all_sent().len(), 4);
    assert_eq!(client.metrics().failures, 1);
}

#[tokio::test]
async fn remote_errors_are_not_retried() {
    let factory = Arc::new(FakeFactory::new());
    factory.push_response(Err(OrchestratorError::Remote { code: -1, message: "no".into() }));
    let client = fake_client(Arc::clone(&factory), 3);

    let err = client.call_tool("t", json!({})).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Remote { .. }));
    assert_eq!(factory.all_sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn per_call_timeout_yields_timeout_error() {
    let mut factory = FakeFactory::new();
    factory.delay = Some(Duration::from_secs(10));
    let client = fake_client(Arc::new(factory), 0);

    let err = client
        .call_tool_with_timeout("t", json!({}), Duration::from_millis(250))
        .await
        .unwrap_err();
    assert_eq!(err, OrchestratorError::Timeout(250));
}

#[tokio::test(start_paused = true)]
async fn dead_connection_is_discarded_and_replaced() {
    let factory = Arc::new(FakeFactory::new());
    factory.push_response(Err(OrchestratorError::ConnectionClosed("exited".into())));
    factory.push_response(Ok(json!({"ok": true})));
    let client = fake_client(Arc::clone(&factory), 1);

    let result = client.call_tool("t", json!({})).await.unwrap();
    assert_eq!(result, json!({"ok": true}));
    // First connection died and was replaced by a fresh one.
    assert_eq!(factory.connect_count(), 2);
    assert!(factory.connections()[0].is_destroyed());
    assert!(!factory.connections()[1].is_destroyed());
}

#[tokio::test(start_paused = true)]
async fn circuit_open_rejections_are_counted_and_not_retried() {
    let factory = Arc::new(FakeFactory::new());
    factory.push_response(Err(OrchestratorError::NetworkUnavailable("down".into())));
    let mut endpoint =
        sb_core::Endpoint::new(TransportKind::Http { url: "http://unused".into() });
    endpoint.max_retries = 3;
    let client = McpClient::with_factory(
        "svc",
        endpoint,
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        BreakerConfig { failure_threshold: 1, reset_timeout_ms: 60_000, ..BreakerConfig::default() },
        PoolConfig::default(),
        Observers::new(),
        FakeClock::new(),
    );

    // Trips the breaker (threshold 1): the transport error is not retried
    // further because every subsequent attempt is rejected at admission.
    let err = client.call_tool("t", json!({})).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::CircuitOpen(_)), "got {err:?}");
    assert_eq!(factory.all_sent().len(), 1);
    assert_eq!(client.metrics().circuit_rejections, 1);
}

#[tokio::test]
async fn ping_sends_ping_method() {
    let factory = Arc::new(FakeFactory::new());
    factory.push_response(Ok(json!({})));
    let client = fake_client(Arc::clone(&factory), 0);

    client.ping().await.unwrap();
    assert_eq!(factory.all_sent()[0].method, "ping");
}

#[tokio::test]
async fn manager_creates_and_reuses_clients() {
    let manager = ClientManager::new(Observers::new(), SystemClock);
    let desc = http_descriptor("svc", "http://localhost:3001");

    let a = manager.get_or_create(&desc).unwrap();
    let b = manager.get_or_create(&desc).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(manager.names(), vec!["svc".to_string()]);
}

#[tokio::test]
async fn manager_remove_drops_client() {
    let manager = ClientManager::new(Observers::new(), SystemClock);
    let desc = http_descriptor("svc", "http://localhost:3001");
    manager.get_or_create(&desc).unwrap();

    manager.remove("svc").await;
    assert!(manager.get("svc").is_none());
}

#[tokio::test]
async fn manager_call_tool_unknown_mcp_is_not_found() {
    let manager = ClientManager::new(Observers::new(), SystemClock);
    let err = manager.call_tool("ghost", "t", json!({}), None).await.unwrap_err();
    assert_eq!(err, OrchestratorError::NotFound("mcp 'ghost'".into()));
}

#[tokio::test]
async fn fake_invoker_scripts_and_records() {
    let invoker = FakeInvoker::new();
    invoker.respond("svc", "t", Ok(json!({"n": 1})));

    let v = invoker.call_tool("svc", "t", json!({"a": 1}), None).await.unwrap();
    assert_eq!(v, json!({"n": 1}));
    let v = invoker.call_tool("svc", "t", json!({}), None).await.unwrap();
    assert_eq!(v, json!({}));
    assert_eq!(invoker.call_keys(), vec!["svc/t", "svc/t"]);
}
