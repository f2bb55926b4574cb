// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow and step definitions.
//!
//! Definitions are immutable after registration; `validate` runs the
//! structural checks (unique step names, resolvable dependencies, acyclic
//! dependency graph) and is called before a definition is accepted.

use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_workflow_timeout_ms() -> u64 {
    300_000
}

fn default_true() -> bool {
    true
}

/// Order in which compensation actions run after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationStrategy {
    /// Reverse of the completion order (saga default).
    #[default]
    ReverseOrder,
    /// Definition order.
    InOrder,
}

/// Undo action attached to a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationDef {
    /// Target service; defaults to the step's own `mcp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp: Option<String>,
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

/// One step of a workflow: a single tool call on a single service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    pub name: String,
    /// Target service name in the discovery registry.
    pub mcp: String,
    /// Tool to invoke on the target.
    pub action: String,
    /// Arguments; string leaves may carry `${path}` / `$path` references.
    #[serde(default)]
    pub params: Value,
    /// Deadline for one attempt; endpoint default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Additional attempts after the first failure.
    #[serde(default)]
    pub retries: u32,
    /// Skip the step unless this evaluates to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<CompensationDef>,
    /// Scheduling hint only; the dependency graph decides real parallelism.
    #[serde(default)]
    pub parallel: bool,
    /// Whether failure of this step fails the workflow.
    #[serde(default = "default_true")]
    pub critical: bool,
    /// Sibling step names that must complete first.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A declarative DAG of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Deadline for the whole run.
    #[serde(default = "default_workflow_timeout_ms")]
    pub timeout_ms: u64,
    /// Workflow-level retry budget, exposed to callers in status output.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub compensation_strategy: CompensationStrategy,
    pub steps: Vec<StepDef>,
}

impl WorkflowDef {
    pub fn step(&self, name: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Structural validation run at registration time.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.name.is_empty() {
            return Err(OrchestratorError::Validation("workflow name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(OrchestratorError::Validation(format!(
                "workflow '{}' has no steps",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            if step.name.is_empty() {
                return Err(OrchestratorError::Validation(format!(
                    "workflow '{}' has a step with an empty name",
                    self.name
                )));
            }
            if !names.insert(step.name.as_str()) {
                return Err(OrchestratorError::Validation(format!(
                    "duplicate step name '{}' in workflow '{}'",
                    step.name, self.name
                )));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if dep == &step.name {
                    return Err(OrchestratorError::Validation(format!(
                        "step '{}' depends on itself",
                        step.name
                    )));
                }
                if !names.contains(dep.as_str()) {
                    return Err(OrchestratorError::Validation(format!(
                        "step '{}' depends on unknown step '{}'",
                        step.name, dep
                    )));
                }
            }
        }

        self.check_acyclic()?;
        Ok(())
    }

    /// Kahn's algorithm; anything left over after peeling is on a cycle.
    fn check_acyclic(&self) -> Result<(), OrchestratorError> {
        let mut in_degree: HashMap<&str, usize> =
            self.steps.iter().map(|s| (s.name.as_str(), s.depends_on.len())).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &self.steps {
            for dep in &step.depends_on {
                dependents.entry(dep.as_str()).or_default().push(step.name.as_str());
            }
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut peeled = 0usize;
        while let Some(name) = ready.pop() {
            peeled += 1;
            for &dependent in dependents.get(name).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(dependent) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(dependent);
                    }
                }
            }
        }

        if peeled < self.steps.len() {
            let mut cyclic: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, d)| *d > 0)
                .map(|(name, _)| name.to_string())
                .collect();
            cyclic.sort();
            return Err(OrchestratorError::Validation(format!(
                "dependency cycle in workflow '{}' involving steps [{}]",
                self.name,
                cyclic.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
