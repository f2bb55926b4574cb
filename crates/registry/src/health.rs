// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Continuous health checks for registered descriptors.
//!
//! HTTP mode issues a GET against the descriptor's health path (any 2xx
//! is healthy); tool-call mode goes through a [`ToolProbe`] supplied by
//! the client layer so probes share the service's circuit breaker.

use crate::registry::McpRegistry;
use async_trait::async_trait;
use sb_core::{HealthCheckMode, McpDescriptor, OrchestratorError, Transport};
use std::sync::Arc;
use std::time::Duration;

/// Minimal tool-call liveness probe, implemented by the client layer.
#[async_trait]
pub trait ToolProbe: Send + Sync + 'static {
    async fn ping(&self, descriptor: &McpDescriptor) -> Result<(), OrchestratorError>;
}

/// Periodically probes every health-enabled descriptor.
pub struct HealthChecker {
    registry: Arc<McpRegistry>,
    http: reqwest::Client,
    probe: Option<Arc<dyn ToolProbe>>,
}

impl HealthChecker {
    pub fn new(registry: Arc<McpRegistry>) -> Self {
        Self { registry, http: reqwest::Client::new(), probe: None }
    }

    /// Enable tool-call mode probing.
    pub fn with_probe(mut self, probe: Arc<dyn ToolProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Check every enabled descriptor whose interval has elapsed.
    /// Returns how many descriptors were probed.
    pub async fn check_due(&self, now_ms: u64) -> usize {
        let due: Vec<McpDescriptor> = self
            .registry
            .list()
            .into_iter()
            .filter(|d| d.health_check.enabled)
            .filter(|d| match d.last_health_check_ms {
                Some(last) => now_ms.saturating_sub(last) >= d.health_check.interval_ms,
                None => true,
            })
            .collect();

        let checked = due.len();
        for descriptor in due {
            let outcome = self.check_one(&descriptor).await;
            self.registry
                .update_health(&descriptor.name, outcome.map_err(|e| e.to_string()));
        }
        checked
    }

    /// Probe one descriptor, regardless of schedule.
    pub async fn check_one(&self, descriptor: &McpDescriptor) -> Result<(), OrchestratorError> {
        match descriptor.health_check.mode {
            HealthCheckMode::Http => self.check_http(descriptor).await,
            HealthCheckMode::ToolCall => match &self.probe {
                Some(probe) => probe.ping(descriptor).await,
                None => {
                    tracing::debug!(name = %descriptor.name, "no tool probe configured, skipping");
                    Ok(())
                }
            },
        }
    }

    async fn check_http(&self, descriptor: &McpDescriptor) -> Result<(), OrchestratorError> {
        let base = descriptor
            .primary_endpoint()
            .and_then(|endpoint| match &endpoint.transport {
                Transport::Http { url } => Some(url.clone()),
                Transport::Subprocess { .. } => None,
            })
            .ok_or_else(|| {
                OrchestratorError::Validation(format!(
                    "mcp '{}' has no http endpoint for health checks",
                    descriptor.name
                ))
            })?;

        let url = format!(
            "{}{}",
            base.trim_end_matches('/'),
            descriptor.health_check.path
        );
        let timeout = Duration::from_millis(descriptor.health_check.timeout_ms);
        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OrchestratorError::Timeout(timeout.as_millis() as u64)
                } else {
                    OrchestratorError::NetworkUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(OrchestratorError::Http5xx(status.as_u16()))
        } else {
            Err(OrchestratorError::NetworkUnavailable(format!("health returned {status}")))
        }
    }
}

/// Spawn the checker loop, ticking every `interval`.
pub fn spawn_health_checker(
    checker: Arc<HealthChecker>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tick.tick().await;
        loop {
            tick.tick().await;
            let now_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64;
            checker.check_due(now_ms).await;
        }
    })
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
