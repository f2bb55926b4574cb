// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring between the discovery registry and the client layer.
//!
//! The registry owns descriptors; [`MeshInvoker`] resolves a step's
//! target through it and lazily creates the resilient client.
//! [`ClientSync`] subscribes to registry change events and retires or
//! refreshes clients whose descriptors went away or changed, so removed
//! services never leave dangling clients behind.

use async_trait::async_trait;
use sb_client::{ClientManager, ToolInvoker};
use sb_core::{Event, McpDescriptor, OrchestratorError, OrchestratorObserver, SystemClock};
use sb_registry::{McpRegistry, ToolProbe};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Tool invocation against discovered services.
pub struct MeshInvoker {
    registry: Arc<McpRegistry>,
    clients: Arc<ClientManager<SystemClock>>,
}

impl MeshInvoker {
    pub fn new(registry: Arc<McpRegistry>, clients: Arc<ClientManager<SystemClock>>) -> Self {
        Self { registry, clients }
    }
}

#[async_trait]
impl ToolInvoker for MeshInvoker {
    async fn call_tool(
        &self,
        mcp: &str,
        tool: &str,
        args: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, OrchestratorError> {
        let descriptor = self
            .registry
            .get(mcp)
            .ok_or_else(|| OrchestratorError::NotFound(format!("mcp '{mcp}'")))?;
        let client = self.clients.get_or_create(&descriptor)?;
        match timeout {
            Some(timeout) => client.call_tool_with_timeout(tool, args, timeout).await,
            None => client.call_tool(tool, args).await,
        }
    }
}

/// Registry observer that keeps the client map in step with the map.
///
/// Must be subscribed from inside a tokio runtime; teardown of retired
/// clients happens on background tasks so event dispatch stays fast.
pub struct ClientSync {
    registry: Arc<McpRegistry>,
    clients: Arc<ClientManager<SystemClock>>,
}

impl ClientSync {
    pub fn new(registry: Arc<McpRegistry>, clients: Arc<ClientManager<SystemClock>>) -> Self {
        Self { registry, clients }
    }

    fn retire(&self, name: &str) {
        let clients = Arc::clone(&self.clients);
        let name = name.to_string();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { clients.remove(&name).await });
        }
    }

    fn refresh(&self, name: &str) {
        // Only rebuild clients that already exist; others are created
        // lazily on first call.
        if self.clients.get(name).is_none() {
            return;
        }
        match self.registry.get(name) {
            Some(descriptor) => {
                if let Err(error) = self.clients.upsert(&descriptor) {
                    tracing::warn!(name, %error, "client refresh failed");
                }
            }
            None => self.retire(name),
        }
    }
}

impl OrchestratorObserver for ClientSync {
    fn on_event(&self, event: &Event) {
        match event {
            Event::McpsRemoved { names } => {
                for name in names {
                    self.retire(name);
                }
            }
            Event::McpsUpdated { names } => {
                for name in names {
                    self.refresh(name);
                }
            }
            _ => {}
        }
    }
}

/// Tool-call health probe backed by the resilient clients, so probes
/// share the service's circuit breaker and pool.
pub struct MeshProbe {
    clients: Arc<ClientManager<SystemClock>>,
}

impl MeshProbe {
    pub fn new(clients: Arc<ClientManager<SystemClock>>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl ToolProbe for MeshProbe {
    async fn ping(&self, descriptor: &McpDescriptor) -> Result<(), OrchestratorError> {
        let client = self.clients.get_or_create(descriptor)?;
        client.ping().await
    }
}

#[cfg(test)]
#[path = "mesh_tests.rs"]
mod tests;
