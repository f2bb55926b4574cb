// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes discovery: services labelled `type=mcp` in one namespace.

use crate::registry::McpRegistry;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ListParams};
use sb_core::{DiscoverySource, McpDescriptor, OrchestratorError, Transport};

/// Label selector for MCP services.
const MCP_LABEL: &str = "type=mcp";

/// Label carrying a comma-separated capability list.
const CAPABILITIES_LABEL: &str = "mcp/capabilities";

/// Build a descriptor from one cluster service.
///
/// The endpoint targets the service's cluster DNS name on its first
/// declared port (default 80); capabilities come from the
/// `mcp/capabilities` label.
pub fn descriptor_from_service(service: &Service, namespace: &str) -> Option<McpDescriptor> {
    let name = service.metadata.name.clone()?;
    let port = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first())
        .map(|p| p.port)
        .unwrap_or(80);

    let url = format!("http://{name}.{namespace}.svc.cluster.local:{port}");
    let mut descriptor =
        McpDescriptor::new(name, Transport::Http { url }, DiscoverySource::Cluster);
    if let Some(labels) = service.metadata.labels.as_ref() {
        if let Some(capabilities) = labels.get(CAPABILITIES_LABEL) {
            descriptor.capabilities = capabilities
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
    Some(descriptor)
}

/// List labelled services in `namespace` and register them. Returns how
/// many descriptors were added.
pub async fn scan_cluster(
    registry: &McpRegistry,
    namespace: &str,
) -> Result<usize, OrchestratorError> {
    let client = kube::Client::try_default()
        .await
        .map_err(|e| OrchestratorError::NetworkUnavailable(format!("kube client: {e}")))?;
    let services: Api<Service> = Api::namespaced(client, namespace);
    let list = services
        .list(&ListParams::default().labels(MCP_LABEL))
        .await
        .map_err(|e| OrchestratorError::NetworkUnavailable(format!("list services: {e}")))?;

    let mut added = 0;
    for service in list.items.iter() {
        let Some(descriptor) = descriptor_from_service(service, namespace) else {
            continue;
        };
        if registry.register_aux(descriptor) {
            added += 1;
        }
    }
    tracing::info!(namespace, added, "cluster scan complete");
    Ok(added)
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
