// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment scan: `MCP_<NAME>_ENDPOINT` variables.

use crate::registry::McpRegistry;
use sb_core::{DiscoverySource, McpDescriptor, Transport};

const PREFIX: &str = "MCP_";
const SUFFIX: &str = "_ENDPOINT";

/// Derive a descriptor name from an `MCP_*_ENDPOINT` variable name.
fn name_from_var(var: &str) -> Option<String> {
    let middle = var.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    if middle.is_empty() {
        return None;
    }
    Some(middle.to_lowercase())
}

/// Scan the process environment and register every endpoint variable.
/// Returns the number of descriptors actually added.
pub fn scan_env(registry: &McpRegistry) -> usize {
    let mut added = 0;
    for (var, value) in std::env::vars() {
        let Some(name) = name_from_var(&var) else {
            continue;
        };
        let Some(transport) = Transport::from_endpoint_str(&value) else {
            tracing::warn!(%var, "empty endpoint variable, skipping");
            continue;
        };
        let descriptor = McpDescriptor::new(name, transport, DiscoverySource::Env);
        if registry.register_aux(descriptor) {
            added += 1;
        }
    }
    added
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
