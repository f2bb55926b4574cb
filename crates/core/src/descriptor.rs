// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service descriptors — the registry's view of one downstream MCP.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Endpoint role conventionally used when none is named.
pub const PRIMARY_ENDPOINT: &str = "primary";

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_weight() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_endpoint_retries() -> u32 {
    3
}

/// Lifecycle status of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpStatus {
    /// Declared in the registry file and considered usable.
    Active,
    /// Reported by an auxiliary source, not yet verified.
    Discovered,
    /// Health checks are failing.
    Failed,
}

crate::simple_display! {
    McpStatus {
        Active => "active",
        Discovered => "discovered",
        Failed => "failed",
    }
}

/// Which discovery mechanism produced a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    File,
    Env,
    Dns,
    Multicast,
    Cluster,
}

crate::simple_display! {
    DiscoverySource {
        File => "file",
        Env => "env",
        Dns => "dns",
        Multicast => "multicast",
        Cluster => "cluster",
    }
}

/// How to reach a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    /// JSON-RPC over HTTP POST.
    Http { url: String },
    /// Line-delimited JSON-RPC over a child process's stdio.
    Subprocess {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Transport {
    /// Parse an endpoint string from the environment: URLs become HTTP,
    /// anything else is split on whitespace into a command line.
    pub fn from_endpoint_str(raw: &str) -> Option<Transport> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.starts_with("http") {
            return Some(Transport::Http { url: raw.to_string() });
        }
        let mut parts = raw.split_whitespace().map(str::to_string);
        let command = parts.next()?;
        Some(Transport::Subprocess { command, args: parts.collect() })
    }
}

/// One way of calling a service, keyed by role in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub transport: Transport,
    /// Per-call deadline in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub timeout_ms: u64,
    /// Transport-level retry budget.
    #[serde(default = "default_endpoint_retries")]
    pub max_retries: u32,
    /// Extra request headers; values may reference `${ENV_VARS}`.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl Endpoint {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            timeout_ms: default_call_timeout_ms(),
            max_retries: default_endpoint_retries(),
            headers: IndexMap::new(),
        }
    }
}

/// Health-check probe style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckMode {
    /// HTTP GET against `path`; any 2xx is healthy.
    Http,
    /// Minimal tool call through the resilient client.
    ToolCall,
}

fn default_health_mode() -> HealthCheckMode {
    HealthCheckMode::Http
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_health_interval_ms() -> u64 {
    30_000
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

/// Per-descriptor health check configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_health_mode")]
    pub mode: HealthCheckMode,
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: default_health_mode(),
            path: default_health_path(),
            interval_ms: default_health_interval_ms(),
            timeout_ms: default_health_timeout_ms(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    60_000
}

fn default_monitoring_period_ms() -> u64 {
    10_000
}

/// Circuit breaker tuning for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures within the monitoring window that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    /// Window after which rolling counters reset.
    #[serde(default = "default_monitoring_period_ms")]
    pub monitoring_period_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            monitoring_period_ms: default_monitoring_period_ms(),
        }
    }
}

/// Circuit breaker state, shared here so events can carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

crate::simple_display! {
    BreakerState {
        Closed => "closed",
        Open => "open",
        HalfOpen => "half_open",
    }
}

/// A downstream MCP service as known to the registry.
///
/// `name` is filled from the registry map key when the file omits it;
/// `endpoints` must contain at least one entry (validated at reload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "McpDescriptor::default_status")]
    pub status: McpStatus,
    /// Scheduling hint: lower wins (DNS SRV convention).
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub endpoints: IndexMap<String, Endpoint>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    /// Names of descriptors this service depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
    #[serde(default = "McpDescriptor::default_source")]
    pub source: DiscoverySource,
    #[serde(default = "default_true")]
    pub healthy: bool,
    #[serde(default)]
    pub discovered_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_health_check_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl McpDescriptor {
    fn default_status() -> McpStatus {
        McpStatus::Active
    }

    fn default_source() -> DiscoverySource {
        DiscoverySource::File
    }

    /// Create a minimal descriptor with one primary endpoint.
    pub fn new(name: impl Into<String>, transport: Transport, source: DiscoverySource) -> Self {
        let mut endpoints = IndexMap::new();
        endpoints.insert(PRIMARY_ENDPOINT.to_string(), Endpoint::new(transport));
        Self {
            name: name.into(),
            version: default_version(),
            status: McpStatus::Discovered,
            priority: 0,
            weight: default_weight(),
            endpoints,
            capabilities: Vec::new(),
            tools: Vec::new(),
            dependencies: Vec::new(),
            health_check: HealthCheckConfig::default(),
            circuit_breaker: BreakerConfig::default(),
            source,
            healthy: true,
            discovered_at_ms: 0,
            last_health_check_ms: None,
            last_error: None,
        }
    }

    /// The `primary` endpoint, falling back to the first declared one.
    pub fn primary_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints
            .get(PRIMARY_ENDPOINT)
            .or_else(|| self.endpoints.values().next())
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
