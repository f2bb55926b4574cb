// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resilient per-service client and the name → client manager.
//!
//! A call travels retry loop → circuit breaker → pool acquire →
//! transport send, with the per-call deadline raced against the
//! transport and signalled to it through a cancellation token.

use crate::breaker::{spawn_window_tick, BreakerStatus, CircuitBreaker};
use crate::http::HttpFactory;
use crate::pool::{spawn_idle_sweep, ConnectionPool, PoolConfig};
use crate::retry::RetryPolicy;
use crate::subprocess::SubprocessFactory;
use crate::transport::TransportFactory;
use crate::wire::RpcRequest;
use async_trait::async_trait;
use parking_lot::Mutex;
use sb_core::{
    ClientMetrics, Clock, Endpoint, McpDescriptor, Observers, OrchestratorError, Transport,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Uniform "invoke a tool on a named service" operation.
///
/// The workflow engine drives steps through this seam; tests substitute
/// a fake.
#[async_trait]
pub trait ToolInvoker: Send + Sync + 'static {
    async fn call_tool(
        &self,
        mcp: &str,
        tool: &str,
        args: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, OrchestratorError>;
}

/// Resilient client for one downstream service.
pub struct McpClient<C: Clock> {
    name: String,
    endpoint: Endpoint,
    pool: Arc<ConnectionPool>,
    breaker: Arc<CircuitBreaker<C>>,
    retry: RetryPolicy,
    metrics: Mutex<ClientMetrics>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl<C: Clock> McpClient<C> {
    /// Build a client from a descriptor's primary endpoint.
    pub fn from_descriptor(
        descriptor: &McpDescriptor,
        pool_config: PoolConfig,
        observers: Observers,
        clock: C,
    ) -> Result<Self, OrchestratorError> {
        let endpoint = descriptor
            .primary_endpoint()
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::Validation(format!("mcp '{}' has no endpoints", descriptor.name))
            })?;

        let factory: Arc<dyn TransportFactory> = match &endpoint.transport {
            Transport::Http { url } => Arc::new(HttpFactory::new(url, endpoint.headers.clone())),
            Transport::Subprocess { command, args } => {
                Arc::new(SubprocessFactory::new(command, args.clone()))
            }
        };

        Ok(Self::with_factory(
            &descriptor.name,
            endpoint,
            factory,
            descriptor.circuit_breaker.clone(),
            pool_config,
            observers,
            clock,
        ))
    }

    /// Build a client over an explicit transport factory.
    pub fn with_factory(
        name: &str,
        endpoint: Endpoint,
        factory: Arc<dyn TransportFactory>,
        breaker_config: sb_core::BreakerConfig,
        pool_config: PoolConfig,
        observers: Observers,
        clock: C,
    ) -> Self {
        Self {
            name: name.to_string(),
            pool: Arc::new(ConnectionPool::new(factory, pool_config)),
            breaker: Arc::new(CircuitBreaker::new(name, breaker_config, clock, observers)),
            retry: RetryPolicy::default().with_max_retries(endpoint.max_retries),
            endpoint,
            metrics: Mutex::new(ClientMetrics::default()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the background chores: breaker window tick, idle sweep,
    /// pool warm-up. Must run inside a tokio runtime.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        tasks.push(spawn_window_tick(Arc::clone(&self.breaker)));
        tasks.push(spawn_idle_sweep(Arc::clone(&self.pool)));
        let pool = Arc::clone(&self.pool);
        tasks.push(tokio::spawn(async move { pool.warm().await }));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint.timeout_ms)
    }

    /// Invoke `tool` with the endpoint's default deadline.
    pub async fn call_tool(&self, tool: &str, args: Value) -> Result<Value, OrchestratorError> {
        self.call_tool_with_timeout(tool, args, self.default_timeout()).await
    }

    /// Invoke `tool` with an explicit per-call deadline.
    pub async fn call_tool_with_timeout(
        &self,
        tool: &str,
        args: Value,
        timeout: Duration,
    ) -> Result<Value, OrchestratorError> {
        self.call_with_retry(RpcRequest::tool_call(0, tool, args), timeout).await
    }

    /// Single liveness probe; one attempt, no retries, still counted by
    /// the breaker.
    pub async fn ping(&self) -> Result<(), OrchestratorError> {
        self.breaker
            .execute(self.attempt(RpcRequest::ping(0), self.default_timeout()))
            .await
            .map(|_| ())
    }

    async fn call_with_retry(
        &self,
        request: RpcRequest,
        timeout: Duration,
    ) -> Result<Value, OrchestratorError> {
        self.metrics.lock().calls += 1;
        let mut retry = 0u32;
        loop {
            let result = self.breaker.execute(self.attempt(request.clone(), timeout)).await;
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay(retry);
                    retry += 1;
                    self.metrics.lock().retries += 1;
                    tracing::debug!(
                        mcp = %self.name,
                        error = %e,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "retrying call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let mut metrics = self.metrics.lock();
                    metrics.failures += 1;
                    if matches!(e, OrchestratorError::CircuitOpen(_)) {
                        metrics.circuit_rejections += 1;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One attempt: acquire, send under the deadline, give the
    /// connection back (or discard it if it died).
    async fn attempt(
        &self,
        request: RpcRequest,
        timeout: Duration,
    ) -> Result<Value, OrchestratorError> {
        let conn = self.pool.acquire().await?;
        let cancel = CancellationToken::new();
        let result = match tokio::time::timeout(timeout, conn.send(request, cancel.clone())).await {
            Ok(res) => res,
            Err(_) => {
                // The send future is already dropped; the token tells the
                // transport the outstanding request is abandoned.
                cancel.cancel();
                Err(OrchestratorError::Timeout(timeout.as_millis() as u64))
            }
        };
        match &result {
            Err(OrchestratorError::ConnectionClosed(_)) => self.pool.discard(conn).await,
            _ => self.pool.release(conn),
        }
        result
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status()
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    pub fn metrics(&self) -> ClientMetrics {
        self.metrics.lock().clone()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Stop background chores and tear the pool down.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.pool.shutdown().await;
    }
}

impl<C: Clock> Drop for McpClient<C> {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Owns the live clients, one per discovered service.
///
/// The engine keeps this map in step with registry change events:
/// added/updated descriptors are upserted, removed descriptors are shut
/// down and dropped.
pub struct ClientManager<C: Clock> {
    clients: Mutex<HashMap<String, Arc<McpClient<C>>>>,
    pool_config: PoolConfig,
    observers: Observers,
    clock: C,
}

impl<C: Clock> ClientManager<C> {
    pub fn new(observers: Observers, clock: C) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            pool_config: PoolConfig::default(),
            observers,
            clock,
        }
    }

    pub fn with_pool_config(mut self, pool_config: PoolConfig) -> Self {
        self.pool_config = pool_config;
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<McpClient<C>>> {
        self.clients.lock().get(name).cloned()
    }

    /// The client for `descriptor`, created and started on first use.
    pub fn get_or_create(
        &self,
        descriptor: &McpDescriptor,
    ) -> Result<Arc<McpClient<C>>, OrchestratorError> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&descriptor.name) {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(McpClient::from_descriptor(
            descriptor,
            self.pool_config.clone(),
            self.observers.clone(),
            self.clock.clone(),
        )?);
        client.start();
        clients.insert(descriptor.name.clone(), Arc::clone(&client));
        Ok(client)
    }

    /// Replace the client for an updated descriptor. The old client is
    /// shut down in the background once its in-flight calls drain.
    pub fn upsert(&self, descriptor: &McpDescriptor) -> Result<(), OrchestratorError> {
        let old = self.clients.lock().remove(&descriptor.name);
        if let Some(old) = old {
            tokio::spawn(async move { old.shutdown().await });
        }
        let mut clients = self.clients.lock();
        let client = Arc::new(McpClient::from_descriptor(
            descriptor,
            self.pool_config.clone(),
            self.observers.clone(),
            self.clock.clone(),
        )?);
        client.start();
        clients.insert(descriptor.name.clone(), client);
        Ok(())
    }

    /// Drop the client for a removed descriptor and drain it.
    pub async fn remove(&self, name: &str) {
        let client = self.clients.lock().remove(name);
        if let Some(client) = client {
            client.shutdown().await;
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.lock().keys().cloned().collect()
    }

    pub async fn shutdown_all(&self) {
        let clients: Vec<_> = {
            let mut map = self.clients.lock();
            map.drain().map(|(_, c)| c).collect()
        };
        for client in clients {
            client.shutdown().await;
        }
    }
}

#[async_trait]
impl<C: Clock> ToolInvoker for ClientManager<C> {
    async fn call_tool(
        &self,
        mcp: &str,
        tool: &str,
        args: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, OrchestratorError> {
        let client = self
            .get(mcp)
            .ok_or_else(|| OrchestratorError::NotFound(format!("mcp '{mcp}'")))?;
        match timeout {
            Some(timeout) => client.call_tool_with_timeout(tool, args, timeout).await,
            None => client.call_tool(tool, args).await,
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
