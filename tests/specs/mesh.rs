// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end: registry file → discovered service → workflow run.

use super::prelude::*;
use sb_client::ClientManager;
use sb_core::SystemClock;
use sb_engine::{ClientSync, MeshInvoker};
use sb_registry::{reload_from_file, McpRegistry};

/// A registry file whose only service is a subprocess echoing canned
/// JSON-RPC replies: the handshake, then one tool result per call.
fn subprocess_registry(dir: &tempfile::TempDir, replies: &[&str]) -> std::path::PathBuf {
    let mut script = String::from(
        r#"read a; printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}'; "#,
    );
    for (i, reply) in replies.iter().enumerate() {
        let id = i + 2;
        script.push_str(&format!(
            r#"read b{i}; printf '%s\n' '{{"jsonrpc":"2.0","id":{id},"result":{reply}}}'; "#
        ));
    }
    let file = serde_json::json!({
        "version": "1.0.0",
        "mcps": {
            "echo": {
                "endpoints": {
                    "primary": {
                        "transport": { "type": "subprocess", "command": "sh", "args": ["-c", script] }
                    }
                },
                "tools": ["speak"]
            }
        }
    });
    let path = dir.path().join("registry.json");
    std::fs::write(&path, serde_json::to_string_pretty(&file).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn workflow_runs_against_a_file_discovered_subprocess() {
    let dir = tempfile::tempdir().unwrap();
    let path = subprocess_registry(&dir, &[r#"{"said":"hello"}"#]);

    let observers = Observers::new();
    let registry = Arc::new(McpRegistry::new(observers.clone()));
    let clients = Arc::new(ClientManager::new(observers.clone(), SystemClock));
    observers.subscribe(Arc::new(ClientSync::new(Arc::clone(&registry), Arc::clone(&clients))));
    reload_from_file(&path, &registry).unwrap();

    let invoker = Arc::new(MeshInvoker::new(Arc::clone(&registry), Arc::clone(&clients)));
    let engine = Arc::new(sb_engine::WorkflowEngine::new(
        invoker,
        observers.clone(),
        EngineConfig::default(),
    ));

    let mut speak = step("speak", &[]);
    speak.mcp = "echo".to_string();
    speak.action = "speak".to_string();
    speak.params = json!({"text": "${input.text}"});
    engine.register_workflow(workflow("greet", vec![speak])).unwrap();

    let run = engine
        .execute_workflow("greet", json!({"text": "hello"}), HashMap::new())
        .await
        .unwrap();

    assert_eq!(run.state, WorkflowState::Completed);
    assert_eq!(run.step("speak").unwrap().result, Some(json!({"said": "hello"})));

    clients.shutdown_all().await;
}
