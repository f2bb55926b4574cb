// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP JSON-RPC transport — one POST per call against `{base_url}/mcp`.

use crate::transport::{Transport, TransportFactory};
use crate::wire::{RpcRequest, RpcResponse};
use async_trait::async_trait;
use indexmap::IndexMap;
use sb_core::OrchestratorError;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Path appended to base URLs that do not already target the RPC endpoint.
const MCP_PATH: &str = "/mcp";

/// Stateless HTTP connection to one service endpoint.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: IndexMap<String, String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, headers: IndexMap<String, String>) -> Self {
        let base = base_url.trim_end_matches('/');
        let url = if base.ends_with(MCP_PATH) {
            base.to_string()
        } else {
            format!("{base}{MCP_PATH}")
        };
        Self { client: reqwest::Client::new(), url, headers }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: RpcRequest,
        cancel: CancellationToken,
    ) -> Result<Value, OrchestratorError> {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request);
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let response = tokio::select! {
            // Dropping the in-flight request aborts it.
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled("call abandoned".to_string())),
            res = req.send() => res.map_err(|e| OrchestratorError::NetworkUnavailable(e.to_string()))?,
        };

        let status = response.status();
        if status.is_server_error() {
            return Err(OrchestratorError::Http5xx(status.as_u16()));
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::NetworkUnavailable(format!("invalid response body: {e}")))?;
        envelope.into_result()
    }

    async fn destroy(&self) {}
}

/// Factory producing [`HttpTransport`] connections.
pub struct HttpFactory {
    base_url: String,
    headers: IndexMap<String, String>,
}

impl HttpFactory {
    pub fn new(base_url: impl Into<String>, headers: IndexMap<String, String>) -> Self {
        Self { base_url: base_url.into(), headers }
    }
}

#[async_trait]
impl TransportFactory for HttpFactory {
    async fn connect(&self) -> Result<Arc<dyn Transport>, OrchestratorError> {
        Ok(Arc::new(HttpTransport::new(&self.base_url, self.headers.clone())))
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
