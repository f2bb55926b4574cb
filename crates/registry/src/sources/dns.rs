// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DNS SRV discovery: each record becomes an HTTP descriptor.

use crate::registry::McpRegistry;
use sb_core::{DiscoverySource, McpDescriptor, OrchestratorError, Transport};
use trust_dns_resolver::TokioAsyncResolver;

/// Build the descriptor for one SRV record.
///
/// The service name is the first label of the record target; the
/// endpoint is `http://<target>:<port>` with the record's priority and
/// weight as scheduling hints.
pub fn descriptor_from_srv(target: &str, port: u16, priority: u16, weight: u16) -> Option<McpDescriptor> {
    let host = target.trim_end_matches('.');
    if host.is_empty() {
        return None;
    }
    let name = host.split('.').next()?.to_lowercase();
    if name.is_empty() {
        return None;
    }
    let mut descriptor = McpDescriptor::new(
        name,
        Transport::Http { url: format!("http://{host}:{port}") },
        DiscoverySource::Dns,
    );
    descriptor.priority = priority as u32;
    descriptor.weight = weight as u32;
    Some(descriptor)
}

/// Resolve `domain` and register every SRV record. Returns how many
/// descriptors were added.
pub async fn scan_dns_srv(
    registry: &McpRegistry,
    domain: &str,
) -> Result<usize, OrchestratorError> {
    let resolver = TokioAsyncResolver::tokio_from_system_conf()
        .map_err(|e| OrchestratorError::NetworkUnavailable(format!("resolver: {e}")))?;
    let lookup = resolver
        .srv_lookup(domain)
        .await
        .map_err(|e| OrchestratorError::NetworkUnavailable(format!("srv {domain}: {e}")))?;

    let mut added = 0;
    for record in lookup.iter() {
        let target = record.target().to_utf8();
        let Some(descriptor) =
            descriptor_from_srv(&target, record.port(), record.priority(), record.weight())
        else {
            continue;
        };
        if registry.register_aux(descriptor) {
            added += 1;
        }
    }
    tracing::info!(domain, added, "dns srv scan complete");
    Ok(added)
}

#[cfg(test)]
#[path = "dns_tests.rs"]
mod tests;
