// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes for pool, client, and engine tests.

use crate::client::ToolInvoker;
use crate::transport::{Transport, TransportFactory};
use crate::wire::RpcRequest;
use async_trait::async_trait;
use parking_lot::Mutex;
use sb_core::OrchestratorError;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Script = Arc<Mutex<VecDeque<Result<Value, OrchestratorError>>>>;

/// Transport whose responses are scripted; unscripted sends return
/// `Ok(null)`.
#[derive(Debug)]
pub struct FakeTransport {
    script: Script,
    sent: Mutex<Vec<RpcRequest>>,
    destroyed: AtomicBool,
    /// Artificial latency before each response.
    pub delay: Option<Duration>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_script(Arc::new(Mutex::new(VecDeque::new())))
    }

    fn with_script(script: Script) -> Self {
        Self { script, sent: Mutex::new(Vec::new()), destroyed: AtomicBool::new(false), delay: None }
    }

    pub fn push_response(&self, response: Result<Value, OrchestratorError>) {
        self.script.lock().push_back(response);
    }

    pub fn sent(&self) -> Vec<RpcRequest> {
        self.sent.lock().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(
        &self,
        request: RpcRequest,
        cancel: CancellationToken,
    ) -> Result<Value, OrchestratorError> {
        self.sent.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(OrchestratorError::Cancelled("call abandoned".to_string()))
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.script.lock().pop_front().unwrap_or(Ok(Value::Null))
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out [`FakeTransport`]s that share one response script.
pub struct FakeFactory {
    script: Script,
    connects: AtomicUsize,
    connections: Mutex<Vec<Arc<FakeTransport>>>,
    /// When set, `connect` fails with this error.
    pub fail_connect: Mutex<Option<OrchestratorError>>,
    /// Latency applied to every connection's sends.
    pub delay: Option<Duration>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            connects: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
            fail_connect: Mutex::new(None),
            delay: None,
        }
    }

    /// Queue a response shared by all connections, FIFO.
    pub fn push_response(&self, response: Result<Value, OrchestratorError>) {
        self.script.lock().push_back(response);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> Vec<Arc<FakeTransport>> {
        self.connections.lock().clone()
    }

    /// Every request sent over any connection, in order of arrival per
    /// connection.
    pub fn all_sent(&self) -> Vec<RpcRequest> {
        self.connections.lock().iter().flat_map(|c| c.sent()).collect()
    }
}

impl Default for FakeFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn connect(&self) -> Result<Arc<dyn Transport>, OrchestratorError> {
        if let Some(err) = self.fail_connect.lock().clone() {
            return Err(err);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let mut transport = FakeTransport::with_script(Arc::clone(&self.script));
        transport.delay = self.delay;
        let transport = Arc::new(transport);
        self.connections.lock().push(Arc::clone(&transport));
        Ok(transport as Arc<dyn Transport>)
    }
}

/// One recorded invocation through a [`FakeInvoker`].
#[derive(Debug, Clone, PartialEq)]
pub struct InvokerCall {
    pub mcp: String,
    pub tool: String,
    pub args: Value,
}

#[derive(Default)]
struct InvokerState {
    calls: Vec<InvokerCall>,
    scripts: std::collections::HashMap<String, VecDeque<Result<Value, OrchestratorError>>>,
}

/// Scripted [`ToolInvoker`] for engine tests.
///
/// Responses are keyed by `"mcp/tool"` and consumed FIFO; calls with no
/// queued response return `Ok({})`.
#[derive(Clone, Default)]
pub struct FakeInvoker {
    state: Arc<Mutex<InvokerState>>,
    /// Latency applied to every call.
    pub delay: Option<Duration>,
}

impl FakeInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue one response for calls to `tool` on `mcp`.
    pub fn respond(&self, mcp: &str, tool: &str, response: Result<Value, OrchestratorError>) {
        self.state
            .lock()
            .scripts
            .entry(format!("{mcp}/{tool}"))
            .or_default()
            .push_back(response);
    }

    /// Queue `n` copies of the same response.
    pub fn respond_times(
        &self,
        mcp: &str,
        tool: &str,
        n: usize,
        response: Result<Value, OrchestratorError>,
    ) {
        for _ in 0..n {
            self.respond(mcp, tool, response.clone());
        }
    }

    pub fn calls(&self) -> Vec<InvokerCall> {
        self.state.lock().calls.clone()
    }

    /// Tools invoked, in order, as `"mcp/tool"` keys.
    pub fn call_keys(&self) -> Vec<String> {
        self.state.lock().calls.iter().map(|c| format!("{}/{}", c.mcp, c.tool)).collect()
    }
}

#[async_trait]
impl ToolInvoker for FakeInvoker {
    async fn call_tool(
        &self,
        mcp: &str,
        tool: &str,
        args: Value,
        _timeout: Option<Duration>,
    ) -> Result<Value, OrchestratorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.calls.push(InvokerCall { mcp: mcp.to_string(), tool: tool.to_string(), args });
        state
            .scripts
            .get_mut(&format!("{mcp}/{tool}"))
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| Ok(serde_json::json!({})))
    }
}
