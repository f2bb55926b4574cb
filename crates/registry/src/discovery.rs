// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires the enabled discovery sources for one deployment environment.

use crate::file::EnvironmentConfig;
use crate::registry::McpRegistry;
use crate::sources::{cluster, dns, env as env_source, multicast};
use crate::watcher::{spawn_registry_watcher, DEFAULT_DEBOUNCE};
use sb_core::OrchestratorError;
use std::path::PathBuf;
use std::sync::Arc;

/// Background tasks started for discovery; abort them to stop.
#[derive(Default)]
pub struct DiscoveryHandles {
    pub tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl DiscoveryHandles {
    pub fn abort_all(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for DiscoveryHandles {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Start the file watcher plus every auxiliary source the environment
/// block enables. One-shot sources (env scan, DNS, cluster) run once at
/// startup; the multicast listener stays resident.
pub async fn spawn_discovery(
    registry: Arc<McpRegistry>,
    registry_path: PathBuf,
    config: &EnvironmentConfig,
) -> Result<DiscoveryHandles, OrchestratorError> {
    let mut handles = DiscoveryHandles::default();

    handles.tasks.push(spawn_registry_watcher(
        registry_path,
        Arc::clone(&registry),
        DEFAULT_DEBOUNCE,
    )?);

    if config.method_enabled("env") {
        let added = env_source::scan_env(&registry);
        tracing::info!(added, "environment scan complete");
    }

    if config.method_enabled("dns") {
        if let Some(domain) = config.dns_domain.clone() {
            let registry = Arc::clone(&registry);
            handles.tasks.push(tokio::spawn(async move {
                if let Err(error) = dns::scan_dns_srv(&registry, &domain).await {
                    tracing::warn!(%domain, %error, "dns discovery failed");
                }
            }));
        } else {
            tracing::warn!("dns discovery enabled without a dnsDomain, skipping");
        }
    }

    if config.method_enabled("multicast") {
        let group = config
            .multicast_group
            .as_deref()
            .and_then(|g| g.parse().ok())
            .unwrap_or(multicast::DEFAULT_GROUP);
        let port = config.multicast_port.unwrap_or(multicast::DEFAULT_PORT);
        match multicast::spawn_multicast_listener(Arc::clone(&registry), group, port).await {
            Ok(task) => handles.tasks.push(task),
            Err(error) => tracing::warn!(%error, "multicast discovery failed to start"),
        }
    }

    if config.method_enabled("kubernetes") {
        let namespace = config.kubernetes_namespace.clone().unwrap_or_else(|| "default".into());
        let registry = Arc::clone(&registry);
        handles.tasks.push(tokio::spawn(async move {
            if let Err(error) = cluster::scan_cluster(&registry, &namespace).await {
                tracing::warn!(%namespace, %error, "cluster discovery failed");
            }
        }));
    }

    Ok(handles)
}
