// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workflow engine: registration, admission, execution, history.

use crate::runner::{self, RunParams};
use parking_lot::Mutex;
use sb_client::ToolInvoker;
use sb_core::{
    Clock, EngineMetrics, Event, Observers, OrchestratorError, SystemClock, WorkflowDef,
    WorkflowRun, WorkflowState,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Engine-wide limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Admission limit for simultaneously active runs.
    pub max_concurrent_workflows: usize,
    /// Global step budget shared by every active run.
    pub max_concurrent_steps: usize,
    /// How long finished runs stay readable in history.
    pub history_retention: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: 50,
            max_concurrent_steps: 10,
            history_retention: Duration::from_secs(24 * 60 * 60),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Default)]
struct Counters {
    started: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
    compensated: u64,
}

#[derive(Clone)]
struct ActiveRun {
    run: Arc<Mutex<WorkflowRun>>,
    cancel: CancellationToken,
}

/// Executes registered workflow definitions against discovered services.
///
/// One engine per process; constructed explicitly and shared via `Arc`.
pub struct WorkflowEngine<I: ToolInvoker> {
    invoker: Arc<I>,
    observers: Observers,
    config: EngineConfig,
    definitions: Mutex<HashMap<String, Arc<WorkflowDef>>>,
    active: Mutex<HashMap<String, ActiveRun>>,
    history: Mutex<HashMap<String, WorkflowRun>>,
    budget: Arc<Semaphore>,
    counters: Mutex<Counters>,
    clock: SystemClock,
}

impl<I: ToolInvoker> WorkflowEngine<I> {
    pub fn new(invoker: Arc<I>, observers: Observers, config: EngineConfig) -> Self {
        let budget = Arc::new(Semaphore::new(config.max_concurrent_steps.max(1)));
        Self {
            invoker,
            observers,
            config,
            definitions: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            budget,
            counters: Mutex::new(Counters::default()),
            clock: SystemClock,
        }
    }

    pub fn observers(&self) -> Observers {
        self.observers.clone()
    }

    /// Register (or replace, by name) a workflow definition.
    pub fn register_workflow(&self, definition: WorkflowDef) -> Result<(), OrchestratorError> {
        definition.validate()?;
        let name = definition.name.clone();
        let replaced =
            self.definitions.lock().insert(name.clone(), Arc::new(definition)).is_some();
        tracing::info!(workflow = %name, replaced, "workflow registered");
        Ok(())
    }

    pub fn list_workflows(&self) -> Vec<Arc<WorkflowDef>> {
        self.definitions.lock().values().cloned().collect()
    }

    /// Execute a registered workflow to a terminal state.
    ///
    /// Returns the terminal run (its `state` and `error` carry the
    /// outcome); `Err` is reserved for rejection before the run starts.
    pub async fn execute_workflow(
        &self,
        name: &str,
        input: Value,
        metadata: HashMap<String, Value>,
    ) -> Result<WorkflowRun, OrchestratorError> {
        let def = self
            .definitions
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(format!("workflow '{name}'")))?;

        let (run_id, run, cancel) = {
            let mut active = self.active.lock();
            if active.len() >= self.config.max_concurrent_workflows {
                return Err(OrchestratorError::Overloaded(active.len()));
            }
            let run = WorkflowRun::new(
                &def.name,
                def.steps.iter().map(|s| s.name.clone()),
                input,
                metadata,
                self.clock.epoch_ms(),
            );
            let run_id = run.id.clone();
            let run = Arc::new(Mutex::new(run));
            let cancel = CancellationToken::new();
            active.insert(
                run_id.as_str().to_string(),
                ActiveRun { run: Arc::clone(&run), cancel: cancel.clone() },
            );
            (run_id, run, cancel)
        };

        self.counters.lock().started += 1;
        {
            let mut guard = run.lock();
            if guard.state == WorkflowState::Pending {
                guard.state = WorkflowState::Running;
            }
            tracing::info!(run_id = %run_id, workflow = %def.name, "workflow started");
            self.observers.emit(Event::WorkflowStarted {
                run_id: run_id.clone(),
                workflow: def.name.clone(),
            });
        }

        runner::drive_run(RunParams {
            def,
            run: Arc::clone(&run),
            invoker: Arc::clone(&self.invoker),
            observers: self.observers.clone(),
            budget: Arc::clone(&self.budget),
            cancel,
        })
        .await;

        let snapshot = run.lock().clone();
        self.active.lock().remove(run_id.as_str());
        {
            let mut counters = self.counters.lock();
            match snapshot.state {
                WorkflowState::Completed => counters.completed += 1,
                WorkflowState::Failed => counters.failed += 1,
                WorkflowState::Cancelled => counters.cancelled += 1,
                WorkflowState::Compensated => counters.compensated += 1,
                _ => {}
            }
        }
        {
            let mut history = self.history.lock();
            history.insert(run_id.as_str().to_string(), snapshot.clone());
            Self::prune_history(&mut history, self.clock.epoch_ms(), self.config.history_retention);
        }
        Ok(snapshot)
    }

    /// Cancel an active run. In-flight steps drain before compensation.
    pub fn cancel_workflow(&self, run_id: &str, reason: &str) -> Result<(), OrchestratorError> {
        let active = self
            .active
            .lock()
            .get(run_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(format!("run '{run_id}'")))?;
        runner::mark_cancelled(&active.run, &self.observers, &active.cancel, reason);
        Ok(())
    }

    /// Status of an active or recently finished run.
    pub fn get_workflow_status(&self, run_id: &str) -> Option<WorkflowRun> {
        if let Some(active) = self.active.lock().get(run_id) {
            return Some(active.run.lock().clone());
        }
        let now = self.clock.epoch_ms();
        let mut history = self.history.lock();
        Self::prune_history(&mut history, now, self.config.history_retention);
        history.get(run_id).cloned()
    }

    pub fn list_active_executions(&self) -> Vec<WorkflowRun> {
        self.active.lock().values().map(|a| a.run.lock().clone()).collect()
    }

    pub fn get_metrics(&self) -> EngineMetrics {
        let counters = self.counters.lock();
        EngineMetrics {
            started: counters.started,
            completed: counters.completed,
            failed: counters.failed,
            cancelled: counters.cancelled,
            compensated: counters.compensated,
            active: self.active.lock().len(),
            registered_workflows: self.definitions.lock().len(),
        }
    }

    /// Steps currently holding a slot of the global budget.
    pub fn running_steps(&self) -> usize {
        self.config.max_concurrent_steps.saturating_sub(self.budget.available_permits())
    }

    /// Emit a liveness heartbeat every `heartbeat_interval`.
    pub fn spawn_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(engine.config.heartbeat_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tick.tick().await;
            loop {
                tick.tick().await;
                engine.observers.emit(Event::Heartbeat {
                    active_workflows: engine.active.lock().len(),
                    running_steps: engine.running_steps(),
                    epoch_ms: engine.clock.epoch_ms(),
                });
            }
        })
    }

    fn prune_history(history: &mut HashMap<String, WorkflowRun>, now_ms: u64, retention: Duration) {
        let cutoff = now_ms.saturating_sub(retention.as_millis() as u64);
        history.retain(|_, run| run.finished_at_ms.map(|t| t >= cutoff).unwrap_or(true));
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
