// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Saga compensation: undo completed steps after a failed or cancelled
//! run.
//!
//! Best-effort by contract: a failing compensation records its error and
//! the pass moves on; it never aborts the remaining compensations and
//! never re-fails the run.

use crate::interpolate::{compensation_context, interpolate_params};
use parking_lot::Mutex;
use sb_client::ToolInvoker;
use sb_core::{
    Clock, CompensationStrategy, Event, Observers, StepState, SystemClock, WorkflowDef,
    WorkflowRun, WorkflowState,
};
use std::sync::Arc;

/// Run the compensation pass if the run's outcome calls for one.
/// Returns whether any compensation was attempted.
pub(crate) async fn compensate<I: ToolInvoker>(
    def: &WorkflowDef,
    run: &Arc<Mutex<WorkflowRun>>,
    invoker: &I,
    observers: &Observers,
    clock: &SystemClock,
) -> bool {
    let candidates: Vec<String> = {
        let guard = run.lock();
        if guard.state != WorkflowState::Failed && guard.state != WorkflowState::Cancelled {
            return false;
        }
        let compensatable = |name: &String| {
            def.step(name).map(|s| s.compensation.is_some()).unwrap_or(false)
                && guard.step(name).map(|e| e.state == StepState::Completed).unwrap_or(false)
        };
        match def.compensation_strategy {
            CompensationStrategy::ReverseOrder => {
                guard.completion_order.iter().rev().filter(|n| compensatable(n)).cloned().collect()
            }
            CompensationStrategy::InOrder => def
                .steps
                .iter()
                .map(|s| s.name.clone())
                .filter(|n| compensatable(n))
                .collect(),
        }
    };
    if candidates.is_empty() {
        return false;
    }

    {
        let mut guard = run.lock();
        guard.state = WorkflowState::Compensating;
        tracing::info!(run_id = %guard.id, steps = candidates.len(), "compensation started");
        observers.emit(Event::CompensationStarted {
            run_id: guard.id.clone(),
            workflow: guard.workflow.clone(),
        });
    }

    for name in candidates {
        compensate_step(def, run, invoker, observers, clock, &name).await;
    }

    {
        let mut guard = run.lock();
        guard.state = WorkflowState::Compensated;
        guard.finished_at_ms = Some(clock.epoch_ms());
        tracing::info!(run_id = %guard.id, "compensation finished");
        observers.emit(Event::WorkflowCompensated {
            run_id: guard.id.clone(),
            workflow: guard.workflow.clone(),
        });
    }
    true
}

async fn compensate_step<I: ToolInvoker>(
    def: &WorkflowDef,
    run: &Arc<Mutex<WorkflowRun>>,
    invoker: &I,
    observers: &Observers,
    clock: &SystemClock,
    name: &str,
) {
    let Some(step_def) = def.step(name) else {
        return;
    };
    let Some(compensation) = step_def.compensation.clone() else {
        return;
    };

    let params = {
        let mut guard = run.lock();
        let (original_result, original_error) = match guard.steps.get_mut(name) {
            Some(execution) => {
                execution.state = StepState::Compensating;
                (execution.result.clone(), execution.error.clone())
            }
            None => (None, None),
        };
        let ctx =
            compensation_context(&guard, original_result.as_ref(), original_error.as_deref());
        interpolate_params(&compensation.params, &ctx)
    };

    let mcp = compensation.mcp.as_deref().unwrap_or(&step_def.mcp);
    match invoker.call_tool(mcp, &compensation.action, params, None).await {
        Ok(_) => {
            let mut guard = run.lock();
            if let Some(execution) = guard.steps.get_mut(name) {
                execution.state = StepState::Compensated;
                execution.finished_at_ms = Some(clock.epoch_ms());
            }
            let event =
                Event::StepCompensated { run_id: guard.id.clone(), step: name.to_string() };
            tracing::debug!(run_id = %guard.id, step = name, "step compensated");
            observers.emit(event);
        }
        Err(error) => {
            let mut guard = run.lock();
            if let Some(execution) = guard.steps.get_mut(name) {
                execution.compensation_error = Some(error.to_string());
            }
            let event = Event::StepCompensationFailed {
                run_id: guard.id.clone(),
                step: name.to_string(),
                error: error.to_string(),
            };
            tracing::warn!(run_id = %guard.id, step = name, %error, "compensation failed");
            observers.emit(event);
        }
    }
}
