// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator events and the observer contract.
//!
//! Events serialize with `{"type": "scope:verb", ...fields}` so the
//! gateway can forward them unmodified. Observers are invoked
//! synchronously, in transition order; emission for one run is
//! serialized by the emitting component.

use crate::descriptor::{BreakerState, DiscoverySource};
use crate::execution::RunId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Notifications emitted as workflows, steps, breakers, and the registry
/// change state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- workflow --
    #[serde(rename = "workflow:started")]
    WorkflowStarted { run_id: RunId, workflow: String },

    #[serde(rename = "workflow:completed")]
    WorkflowCompleted { run_id: RunId, workflow: String, duration_ms: u64 },

    #[serde(rename = "workflow:failed")]
    WorkflowFailed { run_id: RunId, workflow: String, error: String },

    #[serde(rename = "workflow:cancelled")]
    WorkflowCancelled { run_id: RunId, workflow: String, reason: String },

    #[serde(rename = "workflow:compensation_started")]
    CompensationStarted { run_id: RunId, workflow: String },

    #[serde(rename = "workflow:compensated")]
    WorkflowCompensated { run_id: RunId, workflow: String },

    // -- step --
    #[serde(rename = "step:started")]
    StepStarted { run_id: RunId, step: String, attempt: u32 },

    #[serde(rename = "step:completed")]
    StepCompleted { run_id: RunId, step: String },

    #[serde(rename = "step:failed")]
    StepFailed { run_id: RunId, step: String, error: String },

    #[serde(rename = "step:skipped")]
    StepSkipped { run_id: RunId, step: String },

    #[serde(rename = "step:compensated")]
    StepCompensated { run_id: RunId, step: String },

    #[serde(rename = "step:compensation_failed")]
    StepCompensationFailed { run_id: RunId, step: String, error: String },

    // -- client --
    #[serde(rename = "circuit:state_change")]
    CircuitStateChange { mcp: String, from: BreakerState, to: BreakerState },

    // -- registry --
    #[serde(rename = "mcp:discovered")]
    McpDiscovered { name: String, source: DiscoverySource },

    #[serde(rename = "mcp:unhealthy")]
    McpUnhealthy { name: String, error: String },

    #[serde(rename = "mcps:added")]
    McpsAdded { names: Vec<String> },

    #[serde(rename = "mcps:removed")]
    McpsRemoved { names: Vec<String> },

    #[serde(rename = "mcps:updated")]
    McpsUpdated { names: Vec<String> },

    #[serde(rename = "registry:loaded")]
    RegistryLoaded { version: String, count: usize },

    // -- engine liveness --
    #[serde(rename = "heartbeat")]
    Heartbeat { active_workflows: usize, running_steps: usize, epoch_ms: u64 },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::WorkflowStarted { .. } => "workflow:started",
            Event::WorkflowCompleted { .. } => "workflow:completed",
            Event::WorkflowFailed { .. } => "workflow:failed",
            Event::WorkflowCancelled { .. } => "workflow:cancelled",
            Event::CompensationStarted { .. } => "workflow:compensation_started",
            Event::WorkflowCompensated { .. } => "workflow:compensated",
            Event::StepStarted { .. } => "step:started",
            Event::StepCompleted { .. } => "step:completed",
            Event::StepFailed { .. } => "step:failed",
            Event::StepSkipped { .. } => "step:skipped",
            Event::StepCompensated { .. } => "step:compensated",
            Event::StepCompensationFailed { .. } => "step:compensation_failed",
            Event::CircuitStateChange { .. } => "circuit:state_change",
            Event::McpDiscovered { .. } => "mcp:discovered",
            Event::McpUnhealthy { .. } => "mcp:unhealthy",
            Event::McpsAdded { .. } => "mcps:added",
            Event::McpsRemoved { .. } => "mcps:removed",
            Event::McpsUpdated { .. } => "mcps:updated",
            Event::RegistryLoaded { .. } => "registry:loaded",
            Event::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Receives every orchestrator event, synchronously.
///
/// Implementations must be fast and must not block; anything slow
/// belongs behind a channel on the observer's side.
pub trait OrchestratorObserver: Send + Sync + 'static {
    fn on_event(&self, event: &Event);
}

/// Fan-out dispatcher over a set of observers.
///
/// Cloning shares the underlying set; observers registered after a
/// clone are visible to all handles.
#[derive(Clone, Default)]
pub struct Observers {
    inner: Arc<parking_lot::RwLock<Vec<Arc<dyn OrchestratorObserver>>>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn OrchestratorObserver>) {
        self.inner.write().push(observer);
    }

    /// Dispatch one event to every observer, in subscription order.
    pub fn emit(&self, event: Event) {
        tracing::debug!(event = event.name(), "emit");
        let observers = self.inner.read();
        for observer in observers.iter() {
            observer.on_event(&event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(any(test, feature = "test-support"))]
mod collecting {
    use super::{Event, OrchestratorObserver};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Observer that records every event for assertions.
    #[derive(Clone, Default)]
    pub struct CollectingObserver {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl CollectingObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }

        /// Names of recorded events, in emission order.
        pub fn names(&self) -> Vec<&'static str> {
            self.events.lock().iter().map(Event::name).collect()
        }

        pub fn clear(&self) {
            self.events.lock().clear();
        }
    }

    impl OrchestratorObserver for CollectingObserver {
        fn on_event(&self, event: &Event) {
            self.events.lock().push(event.clone());
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use collecting::CollectingObserver;

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
