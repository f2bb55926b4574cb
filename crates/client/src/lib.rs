// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sb-client: Resilient per-service clients.
//!
//! Each downstream MCP gets one [`McpClient`] owning a circuit breaker,
//! a bounded connection pool over its transport (HTTP JSON-RPC or a
//! line-delimited JSON-RPC subprocess), and a retry loop with
//! exponential backoff. [`ClientManager`] keeps the name → client map
//! in step with the discovery registry.

pub mod breaker;
pub mod client;
pub mod http;
pub mod pool;
pub mod retry;
pub mod subprocess;
pub mod transport;
pub mod wire;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use breaker::{BreakerStatus, CircuitBreaker};
pub use client::{ClientManager, McpClient, ToolInvoker};
pub use pool::{ConnectionPool, PoolConfig};
pub use retry::RetryPolicy;
pub use transport::{Transport, TransportFactory};
pub use wire::{RpcError, RpcRequest, RpcResponse, MCP_PROTOCOL_VERSION};
