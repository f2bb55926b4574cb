// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the orchestrator.
//!
//! One enum covers registry validation, client transport failures, and
//! engine scheduling failures so that retry policy and propagation can
//! be decided from the error kind alone.

use thiserror::Error;

/// Errors surfaced by the registry, clients, and workflow engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    /// Registry file or workflow definition has the wrong shape.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown workflow, service, or tool.
    #[error("not found: {0}")]
    NotFound(String),

    /// Workflow admission limit reached.
    #[error("overloaded: {0} workflows already active")]
    Overloaded(usize),

    /// Per-call or per-step deadline exceeded.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// Transport could not reach the downstream service.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Downstream returned an HTTP 5xx status.
    #[error("downstream server error: HTTP {0}")]
    Http5xx(u16),

    /// Downstream application error (JSON-RPC error object).
    #[error("downstream error {code}: {message}")]
    Remote { code: i64, message: String },

    /// Circuit breaker is rejecting calls for this service.
    #[error("circuit open for {0}")]
    CircuitOpen(String),

    /// Subprocess connection died with calls pending.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Connection pool is shutting down.
    #[error("connection pool shut down")]
    PoolShutdown,

    /// No step can make progress.
    #[error("deadlock: steps [{}] can never run", .steps.join(", "))]
    Deadlock { steps: Vec<String> },

    /// Workflow was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl OrchestratorError {
    /// Whether the retry loop may attempt the call again.
    ///
    /// `CircuitOpen` and `Remote` are deliberate rejections; retrying them
    /// either defeats the breaker or repeats a call the downstream already
    /// answered.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::NetworkUnavailable(_)
                | OrchestratorError::Http5xx(_)
                | OrchestratorError::Timeout(_)
                | OrchestratorError::ConnectionClosed(_)
        )
    }

    /// Short stable name for the error kind, used in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "validation",
            OrchestratorError::NotFound(_) => "not_found",
            OrchestratorError::Overloaded(_) => "overloaded",
            OrchestratorError::Timeout(_) => "timeout",
            OrchestratorError::NetworkUnavailable(_) => "network_unavailable",
            OrchestratorError::Http5xx(_) => "http_5xx",
            OrchestratorError::Remote { .. } => "remote",
            OrchestratorError::CircuitOpen(_) => "circuit_open",
            OrchestratorError::ConnectionClosed(_) => "connection_closed",
            OrchestratorError::PoolShutdown => "pool_shutdown",
            OrchestratorError::Deadlock { .. } => "deadlock",
            OrchestratorError::Cancelled(_) => "cancelled",
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
