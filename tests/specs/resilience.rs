// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker and transport scenarios.

use super::prelude::*;
use sb_client::test_support::FakeFactory;
use sb_client::{McpClient, PoolConfig, TransportFactory};
use sb_core::{BreakerConfig, Endpoint, FakeClock, Transport};

fn client_with(
    factory: Arc<FakeFactory>,
    breaker: BreakerConfig,
    clock: FakeClock,
) -> McpClient<FakeClock> {
    let mut endpoint = Endpoint::new(Transport::Http { url: "http://unused".into() });
    endpoint.max_retries = 0;
    McpClient::with_factory(
        "svc",
        endpoint,
        factory as Arc<dyn TransportFactory>,
        breaker,
        PoolConfig::default(),
        Observers::new(),
        clock,
    )
}

#[tokio::test]
async fn breaker_opens_after_threshold_and_recovers_via_probe() {
    let factory = Arc::new(FakeFactory::new());
    for _ in 0..3 {
        factory.push_response(Err(OrchestratorError::Remote { code: -1, message: "boom".into() }));
    }
    factory.push_response(Ok(json!({"ok": true})));

    let clock = FakeClock::new();
    let breaker = BreakerConfig {
        failure_threshold: 3,
        reset_timeout_ms: 100,
        monitoring_period_ms: 60_000,
    };
    let client = client_with(Arc::clone(&factory), breaker, clock.clone());

    // Three consecutive failures trip the breaker.
    for _ in 0..3 {
        let err = client.call_tool("t", json!({})).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Remote { .. }));
    }
    assert_eq!(client.breaker_status().state, sb_core::BreakerState::Open);

    // The fourth call is rejected without touching the transport.
    let err = client.call_tool("t", json!({})).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::CircuitOpen(_)), "got {err:?}");
    assert_eq!(factory.all_sent().len(), 3);

    // After the reset timeout a probe is allowed; its success closes.
    clock.advance(Duration::from_millis(100));
    let result = client.call_tool("t", json!({})).await.unwrap();
    assert_eq!(result, json!({"ok": true}));
    assert_eq!(client.breaker_status().state, sb_core::BreakerState::Closed);
}

#[tokio::test]
async fn subprocess_descriptor_round_trip() {
    // A real child process speaking line-delimited JSON-RPC: handshake,
    // then one tool call.
    let script = r#"read a; printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}'; read b; printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"sum":5}}'"#;
    let mut descriptor = sb_core::McpDescriptor::new(
        "adder",
        Transport::Subprocess {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        },
        sb_core::DiscoverySource::File,
    );
    descriptor.circuit_breaker.failure_threshold = 100;

    let client: McpClient<sb_core::SystemClock> = McpClient::from_descriptor(
        &descriptor,
        PoolConfig { min_size: 0, ..PoolConfig::default() },
        Observers::new(),
        sb_core::SystemClock,
    )
    .unwrap();

    let result = client.call_tool("add", json!({"a": 2, "b": 3})).await.unwrap();
    assert_eq!(result, json!({"sum": 5}));
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dead_subprocess_is_replaced_on_next_call() {
    let factory = Arc::new(FakeFactory::new());
    factory.push_response(Err(OrchestratorError::ConnectionClosed("exited".into())));
    factory.push_response(Ok(json!({"ok": true})));

    let mut endpoint = Endpoint::new(Transport::Http { url: "http://unused".into() });
    endpoint.max_retries = 1;
    let client = McpClient::with_factory(
        "svc",
        endpoint,
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        BreakerConfig { failure_threshold: 100, ..BreakerConfig::default() },
        PoolConfig::default(),
        Observers::new(),
        FakeClock::new(),
    );

    let result = client.call_tool("t", json!({})).await.unwrap();
    assert_eq!(result, json!({"ok": true}));
    // The dead connection was destroyed and a fresh one constructed.
    assert_eq!(factory.connect_count(), 2);
    assert!(factory.connections()[0].is_destroyed());
}
