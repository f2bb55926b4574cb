// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry file parsing, validation, and overlay resolution.
//!
//! The file is the wire shape shared with the gateway (camelCase keys).
//! `parse_and_resolve` turns raw file content into descriptors ready for
//! the registry: names filled from map keys, global overlays merged,
//! `${ENV_VAR}` references in header values resolved against the process
//! environment. Any validation failure rejects the whole reload so the
//! previous map stays authoritative.

use indexmap::IndexMap;
use regex::Regex;
use sb_core::{McpDescriptor, OrchestratorError};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Matches `${SOME_VAR}` references in header values.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("constant regex pattern is valid")
});

/// Per-environment discovery configuration block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Enabled discovery methods: `file`, `env`, `dns`, `multicast`,
    /// `kubernetes`.
    #[serde(default, rename = "discoveryMethods")]
    pub discovery_methods: Vec<String>,
    #[serde(default, rename = "dnsDomain", skip_serializing_if = "Option::is_none")]
    pub dns_domain: Option<String>,
    #[serde(default, rename = "multicastGroup", skip_serializing_if = "Option::is_none")]
    pub multicast_group: Option<String>,
    #[serde(default, rename = "multicastPort", skip_serializing_if = "Option::is_none")]
    pub multicast_port: Option<u16>,
    #[serde(default, rename = "kubernetesNamespace", skip_serializing_if = "Option::is_none")]
    pub kubernetes_namespace: Option<String>,
    #[serde(default, rename = "healthCheckIntervalMs", skip_serializing_if = "Option::is_none")]
    pub health_check_interval_ms: Option<u64>,
}

impl EnvironmentConfig {
    pub fn method_enabled(&self, method: &str) -> bool {
        self.discovery_methods.iter().any(|m| m == method)
    }
}

/// Overlay applied to every descriptor at reload time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Headers merged into every endpoint (per-descriptor values win).
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Default per-call timeout for endpoints that do not set one.
    #[serde(default, rename = "defaultTimeoutMs", skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,
}

/// Gateway routing rules: glob pattern → required capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingRules {
    #[serde(default)]
    pub patterns: IndexMap<String, Vec<String>>,
}

/// The registry file as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub mcps: IndexMap<String, McpDescriptor>,
    #[serde(default)]
    pub environments: IndexMap<String, EnvironmentConfig>,
    #[serde(default, rename = "globalConfig")]
    pub global_config: GlobalConfig,
    #[serde(default)]
    pub routing_rules: RoutingRules,
}

impl RegistryFile {
    /// The configuration block for the current deployment environment.
    pub fn environment(&self, name: &str) -> EnvironmentConfig {
        self.environments.get(name).cloned().unwrap_or_default()
    }
}

/// Parse file content and resolve every descriptor for registry use.
pub fn parse_and_resolve(content: &str) -> Result<RegistryFile, OrchestratorError> {
    let mut file: RegistryFile = serde_json::from_str(content)
        .map_err(|e| OrchestratorError::Validation(format!("registry file: {e}")))?;

    for (key, descriptor) in file.mcps.iter_mut() {
        if descriptor.name.is_empty() {
            descriptor.name = key.clone();
        }
        if descriptor.endpoints.is_empty() {
            return Err(OrchestratorError::Validation(format!(
                "mcp '{key}' declares no endpoints"
            )));
        }
        for endpoint in descriptor.endpoints.values_mut() {
            for (header, value) in &file.global_config.headers {
                if !endpoint.headers.contains_key(header) {
                    endpoint.headers.insert(header.clone(), value.clone());
                }
            }
            if let Some(default_timeout) = file.global_config.default_timeout_ms {
                // Only overlay endpoints that kept the built-in default.
                if endpoint.timeout_ms == 30_000 {
                    endpoint.timeout_ms = default_timeout;
                }
            }
            for value in endpoint.headers.values_mut() {
                *value = resolve_env_refs(value);
            }
        }
    }
    Ok(file)
}

/// Replace `${VAR}` with the process environment value; unknown
/// variables are left verbatim and logged.
fn resolve_env_refs(value: &str) -> String {
    ENV_REF
        .replace_all(value, |caps: &regex::Captures| {
            let var = &caps[1];
            match std::env::var(var) {
                Ok(resolved) => resolved,
                Err(_) => {
                    tracing::warn!(var, "unresolved environment reference in registry header");
                    caps[0].to_string()
                }
            }
        })
        .to_string()
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
