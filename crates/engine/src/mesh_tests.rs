// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sb_core::test_support::http_descriptor;
use sb_core::Observers;
use serde_json::json;

fn wired() -> (Arc<McpRegistry>, Arc<ClientManager<SystemClock>>, MeshInvoker) {
    let observers = Observers::new();
    let registry = Arc::new(McpRegistry::new(observers.clone()));
    let clients = Arc::new(ClientManager::new(observers, SystemClock));
    let invoker = MeshInvoker::new(Arc::clone(&registry), Arc::clone(&clients));
    (registry, clients, invoker)
}

#[tokio::test]
async fn unknown_service_is_not_found() {
    let (_registry, _clients, invoker) = wired();
    let err = invoker.call_tool("ghost", "t", json!({}), None).await.unwrap_err();
    assert_eq!(err, OrchestratorError::NotFound("mcp 'ghost'".into()));
}

#[tokio::test]
async fn known_service_gets_a_client_lazily() {
    let (registry, clients, invoker) = wired();
    let mut descriptor = http_descriptor("svc", "http://127.0.0.1:9");
    if let Some(endpoint) = descriptor.endpoints.get_mut("primary") {
        endpoint.max_retries = 0;
    }
    registry.register_aux(descriptor);
    assert!(clients.get("svc").is_none());

    // The call fails (nothing listens there) but the client now exists.
    let err = invoker.call_tool("svc", "t", json!({}), None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NetworkUnavailable(_)), "got {err:?}");
    assert!(clients.get("svc").is_some());
}

#[tokio::test]
async fn removal_event_retires_the_client() {
    let observers = Observers::new();
    let registry = Arc::new(McpRegistry::new(observers.clone()));
    let clients = Arc::new(ClientManager::new(observers.clone(), SystemClock));
    observers.subscribe(Arc::new(ClientSync::new(Arc::clone(&registry), Arc::clone(&clients))));

    clients.get_or_create(&http_descriptor("svc", "http://127.0.0.1:9")).unwrap();
    assert!(clients.get("svc").is_some());

    observers.emit(Event::McpsRemoved { names: vec!["svc".to_string()] });
    // Teardown happens on a background task.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(clients.get("svc").is_none());
}

#[tokio::test]
async fn update_event_refreshes_existing_clients_only() {
    let observers = Observers::new();
    let registry = Arc::new(McpRegistry::new(observers.clone()));
    let clients = Arc::new(ClientManager::new(observers.clone(), SystemClock));
    let sync = ClientSync::new(Arc::clone(&registry), Arc::clone(&clients));

    registry.register_aux(http_descriptor("svc", "http://127.0.0.1:9"));

    // Not created yet: update is a no-op.
    sync.on_event(&Event::McpsUpdated { names: vec!["svc".to_string()] });
    assert!(clients.get("svc").is_none());

    let before = clients.get_or_create(&registry.get("svc").unwrap()).unwrap();
    sync.on_event(&Event::McpsUpdated { names: vec!["svc".to_string()] });
    let after = clients.get("svc").unwrap();
    assert!(!Arc::ptr_eq(&before, &after), "client should be rebuilt");
}
