// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative in-memory descriptor map.
//!
//! Reads go through a `RwLock`; reloads build the next map completely
//! and swap it in whole, so readers never observe a partial registry.
//! File-sourced entries live and die with the file; auxiliary entries
//! persist until process exit and are carried across reloads.

use crate::file::RegistryFile;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use sb_core::{
    Clock, DiscoverySource, Event, McpDescriptor, McpStatus, Observers, RegistryMetrics,
    SystemClock,
};
use std::collections::HashMap;

/// Names that changed in one reload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub updated: Vec<String>,
}

impl RegistryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

#[derive(Default)]
struct ReloadStats {
    reloads: u64,
    failed_reloads: u64,
    last_loaded_ms: Option<u64>,
}

/// Discovery registry: `name → McpDescriptor`.
pub struct McpRegistry {
    map: RwLock<IndexMap<String, McpDescriptor>>,
    stats: Mutex<ReloadStats>,
    observers: Observers,
    clock: SystemClock,
}

impl McpRegistry {
    pub fn new(observers: Observers) -> Self {
        Self {
            map: RwLock::new(IndexMap::new()),
            stats: Mutex::new(ReloadStats::default()),
            observers,
            clock: SystemClock,
        }
    }

    // ---- queries ----

    pub fn get(&self, name: &str) -> Option<McpDescriptor> {
        self.map.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<McpDescriptor> {
        self.map.read().values().cloned().collect()
    }

    pub fn list_by_capability(&self, capability: &str) -> Vec<McpDescriptor> {
        self.map.read().values().filter(|d| d.has_capability(capability)).cloned().collect()
    }

    pub fn list_by_tool(&self, tool: &str) -> Vec<McpDescriptor> {
        self.map.read().values().filter(|d| d.has_tool(tool)).cloned().collect()
    }

    pub fn list_healthy(&self) -> Vec<McpDescriptor> {
        self.map.read().values().filter(|d| d.healthy).cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.map.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    pub fn metrics(&self) -> RegistryMetrics {
        let map = self.map.read();
        let mut by_source: HashMap<String, usize> = HashMap::new();
        let mut healthy = 0;
        for descriptor in map.values() {
            *by_source.entry(descriptor.source.to_string()).or_default() += 1;
            if descriptor.healthy {
                healthy += 1;
            }
        }
        let stats = self.stats.lock();
        RegistryMetrics {
            total: map.len(),
            healthy,
            by_source,
            reloads: stats.reloads,
            failed_reloads: stats.failed_reloads,
            last_loaded_ms: stats.last_loaded_ms,
        }
    }

    // ---- mutation ----

    /// Swap in a freshly parsed registry file.
    ///
    /// Auxiliary-sourced entries are carried over unless the file now
    /// claims the same name. Emits `mcps:added/removed/updated` for the
    /// change set and `registry:loaded` for the reload itself.
    pub fn load_file(&self, file: RegistryFile) -> RegistryDiff {
        let now = self.clock.epoch_ms();
        let mut next: IndexMap<String, McpDescriptor> = IndexMap::new();
        for (name, mut descriptor) in file.mcps {
            descriptor.source = DiscoverySource::File;
            next.insert(name, descriptor);
        }

        let diff = {
            let mut map = self.map.write();
            // Health state and discovery time belong to the registry, not
            // the file; carry them so a reload neither loses check results
            // nor reports unchanged entries as updated.
            for (name, descriptor) in next.iter_mut() {
                match map.get(name) {
                    Some(previous) => {
                        descriptor.discovered_at_ms = previous.discovered_at_ms;
                        descriptor.healthy = previous.healthy;
                        descriptor.last_health_check_ms = previous.last_health_check_ms;
                        descriptor.last_error = previous.last_error.clone();
                        descriptor.status = previous.status;
                    }
                    None => {
                        if descriptor.discovered_at_ms == 0 {
                            descriptor.discovered_at_ms = now;
                        }
                    }
                }
            }
            // Carry auxiliary entries the file does not claim.
            for (name, descriptor) in map.iter() {
                if descriptor.source != DiscoverySource::File && !next.contains_key(name) {
                    next.insert(name.clone(), descriptor.clone());
                }
            }

            let mut diff = RegistryDiff::default();
            for (name, descriptor) in next.iter() {
                match map.get(name) {
                    None => diff.added.push(name.clone()),
                    Some(previous) if previous != descriptor => diff.updated.push(name.clone()),
                    Some(_) => {}
                }
            }
            for name in map.keys() {
                if !next.contains_key(name) {
                    diff.removed.push(name.clone());
                }
            }

            *map = next;
            diff
        };

        {
            let mut stats = self.stats.lock();
            stats.reloads += 1;
            stats.last_loaded_ms = Some(now);
        }

        tracing::info!(
            version = %file.version,
            count = self.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            updated = diff.updated.len(),
            "registry loaded"
        );
        if !diff.added.is_empty() {
            self.observers.emit(Event::McpsAdded { names: diff.added.clone() });
        }
        if !diff.removed.is_empty() {
            self.observers.emit(Event::McpsRemoved { names: diff.removed.clone() });
        }
        if !diff.updated.is_empty() {
            self.observers.emit(Event::McpsUpdated { names: diff.updated.clone() });
        }
        self.observers.emit(Event::RegistryLoaded { version: file.version, count: self.len() });
        diff
    }

    /// Record a reload that was rejected; the current map stays as-is.
    pub fn record_failed_reload(&self, error: &sb_core::OrchestratorError) {
        self.stats.lock().failed_reloads += 1;
        tracing::warn!(error = %error, "registry reload rejected, keeping previous map");
    }

    /// Register a descriptor from an auxiliary source.
    ///
    /// Only adds names not already present — auxiliary sources never
    /// override the file registry or each other. Returns whether the
    /// descriptor was added.
    pub fn register_aux(&self, mut descriptor: McpDescriptor) -> bool {
        if descriptor.name.is_empty() {
            return false;
        }
        if descriptor.discovered_at_ms == 0 {
            descriptor.discovered_at_ms = self.clock.epoch_ms();
        }
        let added = {
            let mut map = self.map.write();
            if map.contains_key(&descriptor.name) {
                false
            } else {
                map.insert(descriptor.name.clone(), descriptor.clone());
                true
            }
        };
        if added {
            tracing::info!(name = %descriptor.name, source = %descriptor.source, "mcp discovered");
            self.observers.emit(Event::McpDiscovered {
                name: descriptor.name,
                source: descriptor.source,
            });
        }
        added
    }

    /// Apply one health-check outcome.
    ///
    /// Emits `mcp:unhealthy` on the healthy → unhealthy transition and
    /// flips the descriptor status between `Active` and `Failed`.
    pub fn update_health(&self, name: &str, result: Result<(), String>) {
        let now = self.clock.epoch_ms();
        let became_unhealthy = {
            let mut map = self.map.write();
            let Some(descriptor) = map.get_mut(name) else {
                return;
            };
            let was_healthy = descriptor.healthy;
            descriptor.last_health_check_ms = Some(now);
            match &result {
                Ok(()) => {
                    descriptor.healthy = true;
                    descriptor.last_error = None;
                    if descriptor.status == McpStatus::Failed {
                        descriptor.status = McpStatus::Active;
                    }
                    false
                }
                Err(error) => {
                    descriptor.healthy = false;
                    descriptor.last_error = Some(error.clone());
                    descriptor.status = McpStatus::Failed;
                    was_healthy
                }
            }
        };
        if became_unhealthy {
            let error = result.err().unwrap_or_default();
            tracing::warn!(name, %error, "mcp became unhealthy");
            self.observers.emit(Event::McpUnhealthy { name: name.to_string(), error });
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
