// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run execution state for workflows and their steps.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for one workflow run.
    pub struct RunId("wfr-");
}

/// State of a single step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Compensating,
    Compensated,
}

impl StepState {
    /// Whether the scheduler is done with this step.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            StepState::Completed | StepState::Failed | StepState::Skipped | StepState::Compensated
        )
    }
}

crate::simple_display! {
    StepState {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Skipped => "skipped",
        Compensating => "compensating",
        Compensated => "compensated",
    }
}

/// State of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Compensating,
    Compensated,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed
                | WorkflowState::Failed
                | WorkflowState::Cancelled
                | WorkflowState::Compensated
        )
    }
}

crate::simple_display! {
    WorkflowState {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        Compensating => "compensating",
        Compensated => "compensated",
    }
}

/// Execution record for one step of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub name: String,
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// Attempts made so far (first attempt is 1).
    #[serde(default)]
    pub attempt: u32,
    /// Error from a failed compensation call, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_error: Option<String>,
}

impl StepExecution {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: StepState::Pending,
            result: None,
            error: None,
            started_at_ms: None,
            finished_at_ms: None,
            attempt: 0,
            compensation_error: None,
        }
    }
}

/// Execution context for one workflow run.
///
/// The engine owns the run exclusively while it is active; once the run
/// reaches a terminal state it moves to the bounded history map and is
/// no longer mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    /// Name of the registered definition this run executes.
    pub workflow: String,
    pub state: WorkflowState,
    /// Frozen caller input.
    pub input: Value,
    /// Step executions in definition order.
    pub steps: IndexMap<String, StepExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// Free-form values readable through `${variables.<key>}`.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// Caller-supplied metadata, carried through untouched.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Step names in the order they completed, for reverse-order compensation.
    #[serde(default)]
    pub completion_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl WorkflowRun {
    pub fn new(
        workflow: impl Into<String>,
        step_names: impl IntoIterator<Item = String>,
        input: Value,
        metadata: HashMap<String, Value>,
        started_at_ms: u64,
    ) -> Self {
        let steps = step_names
            .into_iter()
            .map(|name| (name.clone(), StepExecution::new(name)))
            .collect();
        Self {
            id: RunId::generate(),
            workflow: workflow.into(),
            state: WorkflowState::Pending,
            input,
            steps,
            result: None,
            error: None,
            started_at_ms,
            finished_at_ms: None,
            variables: HashMap::new(),
            metadata,
            completion_order: Vec::new(),
            cancel_reason: None,
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepExecution> {
        self.steps.get(name)
    }

    /// All steps the scheduler still has to deal with.
    pub fn unsettled_steps(&self) -> impl Iterator<Item = &StepExecution> {
        self.steps.values().filter(|s| !s.state.is_settled())
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at_ms.map(|end| end.saturating_sub(self.started_at_ms))
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
