// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery registry scenarios.

use super::prelude::*;
use sb_registry::{reload_from_file, McpRegistry};
use std::path::PathBuf;

fn registry_file(dir: &tempfile::TempDir, names: &[&str]) -> PathBuf {
    let mcps = names
        .iter()
        .map(|n| {
            format!(
                r#""{n}": {{ "endpoints": {{ "primary": {{ "transport": {{ "type": "http", "url": "http://{n}:3001" }}, "max_retries": 0 }} }} }}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    let path = dir.path().join("registry.json");
    std::fs::write(&path, format!(r#"{{ "version": "1.0.0", "mcps": {{ {mcps} }} }}"#)).unwrap();
    path
}

fn registry_with_sink() -> (Arc<McpRegistry>, CollectingObserver) {
    let observers = Observers::new();
    let sink = CollectingObserver::new();
    observers.subscribe(Arc::new(sink.clone()));
    (Arc::new(McpRegistry::new(observers)), sink)
}

#[tokio::test]
async fn hot_reload_add_is_visible_and_announced() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_file(&dir, &["search"]);
    let (registry, sink) = registry_with_sink();
    reload_from_file(&path, &registry).unwrap();
    sink.clear();

    // The file grows a service; the reload announces exactly that.
    registry_file(&dir, &["search", "billing"]);
    reload_from_file(&path, &registry).unwrap();

    assert_eq!(
        sink.events()[0],
        sb_core::Event::McpsAdded { names: vec!["billing".to_string()] }
    );
    let descriptor = registry.get("billing").unwrap();
    assert_eq!(descriptor.name, "billing");
    assert!(registry.get("search").is_some());
}

#[tokio::test]
async fn newly_discovered_service_is_usable_by_workflows() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_file(&dir, &["search"]);
    let (registry, _sink) = registry_with_sink();
    reload_from_file(&path, &registry).unwrap();

    // A workflow against the discovered name resolves through the mesh;
    // the endpoint is dead, so the call fails downstream of discovery.
    let clients = Arc::new(sb_client::ClientManager::new(Observers::new(), sb_core::SystemClock));
    let invoker = sb_engine::MeshInvoker::new(Arc::clone(&registry), clients);
    let err = sb_client::ToolInvoker::call_tool(
        &invoker,
        "search",
        "lookup",
        json!({}),
        Some(Duration::from_millis(200)),
    )
    .await
    .unwrap_err();
    assert!(
        !matches!(err, OrchestratorError::NotFound(_)),
        "descriptor should resolve, got {err:?}"
    );
}

#[tokio::test]
async fn invalid_reload_keeps_previous_registry() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_file(&dir, &["search"]);
    let (registry, sink) = registry_with_sink();
    reload_from_file(&path, &registry).unwrap();
    sink.clear();

    std::fs::write(&path, r#"{ "mcps": { "broken": { "endpoints": {} } } }"#).unwrap();
    let err = reload_from_file(&path, &registry).unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    assert!(registry.get("search").is_some());
    assert!(registry.get("broken").is_none());
    assert!(sink.events().is_empty());
    assert_eq!(registry.metrics().failed_reloads, 1);
}

#[tokio::test]
async fn capability_and_tool_queries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    std::fs::write(
        &path,
        r#"{
            "mcps": {
                "search": {
                    "endpoints": { "primary": { "transport": { "type": "http", "url": "http://s" } } },
                    "capabilities": ["query"],
                    "tools": ["lookup", "suggest"]
                },
                "billing": {
                    "endpoints": { "primary": { "transport": { "type": "http", "url": "http://b" } } },
                    "capabilities": ["invoice"]
                }
            }
        }"#,
    )
    .unwrap();
    let (registry, _sink) = registry_with_sink();
    reload_from_file(&path, &registry).unwrap();

    assert_eq!(registry.list().len(), 2);
    assert_eq!(registry.list_by_capability("query").len(), 1);
    assert_eq!(registry.list_by_tool("suggest")[0].name, "search");
    assert_eq!(registry.list_healthy().len(), 2);
}
