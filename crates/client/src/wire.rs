// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC 2.0 envelope types for the MCP wire protocol.

use sb_core::OrchestratorError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// MCP protocol revision sent in the `initialize` handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Client identifier sent in the `initialize` handshake.
pub const CLIENT_NAME: &str = "switchboard";

const JSONRPC_VERSION: &str = "2.0";

/// Outbound JSON-RPC request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), method: method.into(), params, id }
    }

    /// The one-time handshake sent when a subprocess connection opens.
    pub fn initialize(id: u64) -> Self {
        Self::new(
            id,
            "initialize",
            Some(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": CLIENT_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
        )
    }

    /// A `tools/call` invocation of `tool` with the given arguments.
    pub fn tool_call(id: u64, tool: &str, arguments: Value) -> Self {
        Self::new(id, "tools/call", Some(json!({ "name": tool, "arguments": arguments })))
    }

    /// Liveness probe used by tool-call health checks.
    pub fn ping(id: u64) -> Self {
        Self::new(id, "ping", None)
    }
}

/// JSON-RPC error object from a downstream service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Inbound JSON-RPC response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Collapse the envelope into a result, surfacing downstream errors
    /// as [`OrchestratorError::Remote`].
    pub fn into_result(self) -> Result<Value, OrchestratorError> {
        match self.error {
            Some(err) => {
                Err(OrchestratorError::Remote { code: err.code, message: err.message })
            }
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
