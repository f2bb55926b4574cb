// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction — one connection to one downstream service.

use crate::wire::RpcRequest;
use async_trait::async_trait;
use sb_core::OrchestratorError;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One live connection supporting JSON-RPC request/response.
///
/// `cancel` is the abandon signal: when it fires the transport must give
/// up on the outstanding request (drop the HTTP call, deregister the
/// subprocess waiter) and may return [`OrchestratorError::Cancelled`];
/// the caller has already resolved the call as timed out.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync + 'static {
    async fn send(
        &self,
        request: RpcRequest,
        cancel: CancellationToken,
    ) -> Result<Value, OrchestratorError>;

    /// Tear the connection down. Idempotent.
    async fn destroy(&self);
}

/// Constructs connections for the pool.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    async fn connect(&self) -> Result<Arc<dyn Transport>, OrchestratorError>;
}
