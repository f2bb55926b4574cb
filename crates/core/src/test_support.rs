// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared constructors for tests across the workspace.

use crate::descriptor::{DiscoverySource, McpDescriptor, Transport};
use crate::workflow::{StepDef, WorkflowDef};
use serde_json::Value;

/// A step named `name` targeting service `svc`, action `run`, with the
/// given dependencies and otherwise default fields.
pub fn step(name: &str, depends_on: &[&str]) -> StepDef {
    StepDef {
        name: name.to_string(),
        mcp: "svc".to_string(),
        action: "run".to_string(),
        params: Value::Null,
        timeout_ms: None,
        retries: 0,
        condition: None,
        compensation: None,
        parallel: false,
        critical: true,
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
    }
}

/// A workflow with default timeouts wrapping the given steps.
pub fn workflow(name: &str, steps: Vec<StepDef>) -> WorkflowDef {
    WorkflowDef {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        description: String::new(),
        timeout_ms: 300_000,
        max_retries: 0,
        compensation_strategy: Default::default(),
        steps,
    }
}

/// An HTTP descriptor for `name` at `url`, sourced from the file registry.
pub fn http_descriptor(name: &str, url: &str) -> McpDescriptor {
    McpDescriptor::new(name, Transport::Http { url: url.to_string() }, DiscoverySource::File)
}
