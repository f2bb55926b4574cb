// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics snapshots exposed by the engine, registry, and clients.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Workflow engine counters, reported by `get_metrics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub compensated: u64,
    pub active: usize,
    pub registered_workflows: usize,
}

/// Discovery registry counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryMetrics {
    pub total: usize,
    pub healthy: usize,
    pub by_source: HashMap<String, usize>,
    pub reloads: u64,
    pub failed_reloads: u64,
    pub last_loaded_ms: Option<u64>,
}

/// Per-service client counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMetrics {
    pub calls: u64,
    pub failures: u64,
    pub retries: u64,
    pub circuit_rejections: u64,
}
