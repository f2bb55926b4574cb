// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run scheduler loop.
//!
//! Launches every step whose dependencies are complete and whose
//! condition holds, bounded by the engine-wide step budget. Steps run
//! as tasks; their outcomes flow back here, where retries, skips,
//! critical failures, deadlock detection, and the workflow deadline are
//! decided. All state writes and event emissions happen under the run
//! mutex, so observers see transitions in order.

use crate::condition::eval_condition;
use crate::interpolate::{context_value, interpolate_params, interpolate_text};
use crate::saga;
use parking_lot::Mutex;
use sb_client::ToolInvoker;
use sb_core::{
    Clock, Event, Observers, OrchestratorError, StepDef, StepState, SystemClock, WorkflowDef,
    WorkflowRun, WorkflowState,
};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Everything one run needs to execute.
pub(crate) struct RunParams<I: ToolInvoker> {
    pub def: Arc<WorkflowDef>,
    pub run: Arc<Mutex<WorkflowRun>>,
    pub invoker: Arc<I>,
    pub observers: Observers,
    pub budget: Arc<Semaphore>,
    pub cancel: CancellationToken,
}

/// Outcome of one step attempt, reported back to the scheduler.
struct StepMsg {
    name: String,
    attempt: u32,
    /// False when the task gave up before entering `Running`.
    started: bool,
    result: Result<Value, OrchestratorError>,
}

/// Mark the run cancelled (idempotent) and stop the scheduler's intake.
/// In-flight steps drain naturally.
pub(crate) fn mark_cancelled(
    run: &Arc<Mutex<WorkflowRun>>,
    observers: &Observers,
    cancel: &CancellationToken,
    reason: &str,
) {
    {
        let mut run = run.lock();
        if run.state != WorkflowState::Running && run.state != WorkflowState::Pending {
            return;
        }
        run.state = WorkflowState::Cancelled;
        run.cancel_reason = Some(reason.to_string());
        tracing::info!(run_id = %run.id, reason, "workflow cancelled");
        observers.emit(Event::WorkflowCancelled {
            run_id: run.id.clone(),
            workflow: run.workflow.clone(),
            reason: reason.to_string(),
        });
    }
    cancel.cancel();
}

/// Drive the run to a terminal state, compensation included.
pub(crate) async fn drive_run<I: ToolInvoker>(params: RunParams<I>) {
    let RunParams { def, run, invoker, observers, budget, cancel } = params;
    let clock = SystemClock;

    let deadline =
        tokio::time::Instant::now() + Duration::from_millis(def.timeout_ms.max(1));
    let mut timed_out = false;
    let mut tasks: JoinSet<StepMsg> = JoinSet::new();
    let mut in_flight: HashSet<String> = HashSet::new();
    let mut deadlocked: Option<Vec<String>> = None;
    let mut critical_failure = false;

    loop {
        let intake_stopped = cancel.is_cancelled() || critical_failure;

        if !intake_stopped {
            launch_ready(
                &def,
                &run,
                &invoker,
                &observers,
                &budget,
                &cancel,
                &mut tasks,
                &mut in_flight,
                &clock,
            );
        }

        {
            let guard = run.lock();
            let all_settled = guard.steps.values().all(|s| s.state.is_settled());
            if all_settled && tasks.is_empty() {
                break;
            }
        }

        if tasks.is_empty() {
            if intake_stopped {
                break;
            }
            // Nothing running, nothing launchable, steps still pending.
            let blocked: Vec<String> = {
                let guard = run.lock();
                guard
                    .steps
                    .values()
                    .filter(|s| s.state == StepState::Pending)
                    .map(|s| s.name.clone())
                    .collect()
            };
            deadlocked = Some(blocked);
            break;
        }

        tokio::select! {
            joined = tasks.join_next() => {
                let msg = match joined {
                    Some(Ok(msg)) => msg,
                    Some(Err(join_error)) => {
                        tracing::error!(error = %join_error, "step task died");
                        continue;
                    }
                    None => continue,
                };
                in_flight.remove(&msg.name);
                critical_failure |= settle_step(&def, &run, &observers, msg, &clock);
            }
            _ = tokio::time::sleep_until(deadline), if !timed_out => {
                timed_out = true;
                mark_cancelled(&run, &observers, &cancel, "timeout");
            }
        }
    }

    finalize(&def, &run, &observers, deadlocked, &clock);
    saga::compensate(&def, &run, invoker.as_ref(), &observers, &clock).await;
}

/// Launch every pending step whose dependencies are complete. Condition
/// evaluation happens here; a false condition skips the step outright.
#[allow(clippy::too_many_arguments)]
fn launch_ready<I: ToolInvoker>(
    def: &Arc<WorkflowDef>,
    run: &Arc<Mutex<WorkflowRun>>,
    invoker: &Arc<I>,
    observers: &Observers,
    budget: &Arc<Semaphore>,
    cancel: &CancellationToken,
    tasks: &mut JoinSet<StepMsg>,
    in_flight: &mut HashSet<String>,
    clock: &SystemClock,
) {
    let ready: Vec<StepDef> = {
        let guard = run.lock();
        def.steps
            .iter()
            .filter(|step| {
                guard.step(&step.name).map(|s| s.state == StepState::Pending).unwrap_or(false)
            })
            .filter(|step| !in_flight.contains(&step.name))
            .filter(|step| {
                step.depends_on.iter().all(|dep| {
                    guard.step(dep).map(|s| s.state == StepState::Completed).unwrap_or(false)
                })
            })
            .cloned()
            .collect()
    };

    for step in ready {
        if let Some(condition) = &step.condition {
            let interpolated = {
                let guard = run.lock();
                interpolate_text(condition, &context_value(&guard))
            };
            if !eval_condition(&interpolated) {
                let mut guard = run.lock();
                if let Some(execution) = guard.steps.get_mut(&step.name) {
                    execution.state = StepState::Skipped;
                    execution.finished_at_ms = Some(clock.epoch_ms());
                }
                let event = Event::StepSkipped { run_id: guard.id.clone(), step: step.name.clone() };
                tracing::debug!(step = %step.name, condition = %interpolated, "condition false, step skipped");
                observers.emit(event);
                continue;
            }
        }

        in_flight.insert(step.name.clone());
        tasks.spawn(step_attempt(
            step,
            Arc::clone(run),
            Arc::clone(invoker),
            observers.clone(),
            Arc::clone(budget),
            cancel.clone(),
        ));
    }
}

/// One attempt of one step: wait for budget, interpolate, invoke.
async fn step_attempt<I: ToolInvoker>(
    step: StepDef,
    run: Arc<Mutex<WorkflowRun>>,
    invoker: Arc<I>,
    observers: Observers,
    budget: Arc<Semaphore>,
    cancel: CancellationToken,
) -> StepMsg {
    let _permit = match Arc::clone(&budget).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return StepMsg {
                name: step.name,
                attempt: 0,
                started: false,
                result: Err(OrchestratorError::Cancelled("engine shut down".to_string())),
            }
        }
    };
    if cancel.is_cancelled() {
        return StepMsg {
            name: step.name,
            attempt: 0,
            started: false,
            result: Err(OrchestratorError::Cancelled("workflow cancelled".to_string())),
        };
    }

    let clock = SystemClock;
    let (attempt, params) = {
        let mut guard = run.lock();
        let ctx = context_value(&guard);
        let attempt = match guard.steps.get_mut(&step.name) {
            Some(execution) => {
                execution.state = StepState::Running;
                execution.attempt += 1;
                execution.started_at_ms.get_or_insert(clock.epoch_ms());
                execution.attempt
            }
            None => 1,
        };
        let event = Event::StepStarted {
            run_id: guard.id.clone(),
            step: step.name.clone(),
            attempt,
        };
        tracing::debug!(run_id = %guard.id, step = %step.name, attempt, mcp = %step.mcp, "step started");
        observers.emit(event);
        (attempt, interpolate_params(&step.params, &ctx))
    };

    let timeout = step.timeout_ms.map(Duration::from_millis);
    let call = invoker.call_tool(&step.mcp, &step.action, params, timeout);
    let result = match timeout {
        // The step deadline bounds this attempt as a whole, including
        // the client's internal retries.
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::Timeout(limit.as_millis() as u64)),
        },
        None => call.await,
    };

    StepMsg { name: step.name, attempt, started: true, result }
}

/// Apply one step outcome. Returns true if this was a critical failure
/// that must stop the workflow.
fn settle_step(
    def: &WorkflowDef,
    run: &Arc<Mutex<WorkflowRun>>,
    observers: &Observers,
    msg: StepMsg,
    clock: &SystemClock,
) -> bool {
    let mut guard = run.lock();
    let state = &mut *guard;
    let run_id = state.id.clone();
    let Some(execution) = state.steps.get_mut(&msg.name) else {
        return false;
    };

    if !msg.started {
        // Never entered Running (cancelled while queued on the budget).
        execution.state = StepState::Pending;
        return false;
    }

    let step_def = def.step(&msg.name);
    let retries = step_def.map(|s| s.retries).unwrap_or(0);
    let critical = step_def.map(|s| s.critical).unwrap_or(true);

    match msg.result {
        Ok(value) => {
            execution.state = StepState::Completed;
            execution.result = Some(value);
            execution.error = None;
            execution.finished_at_ms = Some(clock.epoch_ms());
            state.completion_order.push(msg.name.clone());
            tracing::debug!(run_id = %run_id, step = %msg.name, "step completed");
            observers.emit(Event::StepCompleted { run_id, step: msg.name });
            false
        }
        Err(error) if msg.attempt <= retries => {
            // Budget remains: back to pending, silently retried.
            execution.state = StepState::Pending;
            execution.error = Some(error.to_string());
            tracing::debug!(
                run_id = %run_id,
                step = %msg.name,
                attempt = msg.attempt,
                %error,
                "step attempt failed, will retry"
            );
            false
        }
        Err(error) => {
            execution.error = Some(error.to_string());
            execution.finished_at_ms = Some(clock.epoch_ms());
            if critical {
                execution.state = StepState::Failed;
                tracing::warn!(run_id = %run_id, step = %msg.name, %error, "critical step failed");
                observers.emit(Event::StepFailed {
                    run_id,
                    step: msg.name,
                    error: error.to_string(),
                });
                true
            } else {
                // Non-critical failures degrade to skipped; the workflow
                // carries on without them.
                execution.state = StepState::Skipped;
                tracing::info!(run_id = %run_id, step = %msg.name, %error, "non-critical step failed, skipping");
                observers.emit(Event::StepFailed {
                    run_id: run_id.clone(),
                    step: msg.name.clone(),
                    error: error.to_string(),
                });
                observers.emit(Event::StepSkipped { run_id, step: msg.name });
                false
            }
        }
    }
}

/// Compute the run outcome once the loop exits.
fn finalize(
    def: &WorkflowDef,
    run: &Arc<Mutex<WorkflowRun>>,
    observers: &Observers,
    deadlocked: Option<Vec<String>>,
    clock: &SystemClock,
) {
    let mut guard = run.lock();
    guard.finished_at_ms = Some(clock.epoch_ms());

    if guard.state != WorkflowState::Running {
        // Cancelled (externally or by timeout); the event already fired.
        return;
    }

    if let Some(steps) = deadlocked {
        let error = OrchestratorError::Deadlock { steps };
        guard.state = WorkflowState::Failed;
        guard.error = Some(error.to_string());
        tracing::warn!(run_id = %guard.id, %error, "workflow deadlocked");
        observers.emit(Event::WorkflowFailed {
            run_id: guard.id.clone(),
            workflow: guard.workflow.clone(),
            error: error.to_string(),
        });
        return;
    }

    let failed_step = def
        .steps
        .iter()
        .filter(|s| s.critical)
        .find_map(|s| {
            guard
                .step(&s.name)
                .filter(|e| e.state == StepState::Failed)
                .and_then(|e| e.error.clone().map(|err| (s.name.clone(), err)))
        });

    match failed_step {
        Some((step, error)) => {
            guard.state = WorkflowState::Failed;
            guard.error = Some(format!("step '{step}' failed: {error}"));
            tracing::warn!(run_id = %guard.id, step = %step, %error, "workflow failed");
            observers.emit(Event::WorkflowFailed {
                run_id: guard.id.clone(),
                workflow: guard.workflow.clone(),
                error: guard.error.clone().unwrap_or_default(),
            });
        }
        None => {
            let mut results = Map::new();
            for (name, execution) in &guard.steps {
                if let Some(result) = &execution.result {
                    results.insert(name.clone(), result.clone());
                }
            }
            guard.state = WorkflowState::Completed;
            guard.result = Some(Value::Object(results));
            let duration_ms = guard.duration_ms().unwrap_or_default();
            tracing::info!(run_id = %guard.id, duration_ms, "workflow completed");
            observers.emit(Event::WorkflowCompleted {
                run_id: guard.id.clone(),
                workflow: guard.workflow.clone(),
                duration_ms,
            });
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
