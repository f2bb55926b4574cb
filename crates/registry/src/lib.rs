// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sb-registry: Discovery registry for downstream MCP services.
//!
//! The authoritative in-memory map of service descriptors, rebuilt
//! atomically from the registry file on debounced file-watch reloads and
//! extended by auxiliary sources (environment scan, DNS SRV, UDP
//! multicast announcements, Kubernetes services). A health checker keeps
//! per-descriptor liveness current.

pub mod discovery;
pub mod env;
pub mod file;
pub mod health;
pub mod registry;
pub mod routing;
pub mod sources;
pub mod watcher;

pub use discovery::{spawn_discovery, DiscoveryHandles};
pub use file::{EnvironmentConfig, GlobalConfig, RegistryFile, RoutingRules};
pub use health::{HealthChecker, ToolProbe};
pub use registry::{McpRegistry, RegistryDiff};
pub use routing::CompiledRoutes;
pub use watcher::{reload_from_file, spawn_registry_watcher};
