// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for scenario specs.

pub use sb_client::test_support::FakeInvoker;
pub use sb_core::test_support::{step, workflow};
pub use sb_core::{
    CollectingObserver, Observers, OrchestratorError, StepState, WorkflowState,
};
pub use sb_engine::{EngineConfig, WorkflowEngine};
pub use serde_json::json;
pub use std::collections::HashMap;
pub use std::sync::Arc;
pub use std::time::Duration;

/// Engine over a scripted invoker, with an attached event sink.
pub fn engine(
    invoker: FakeInvoker,
    config: EngineConfig,
) -> (Arc<WorkflowEngine<FakeInvoker>>, CollectingObserver) {
    let observers = Observers::new();
    let sink = CollectingObserver::new();
    observers.subscribe(Arc::new(sink.clone()));
    (Arc::new(WorkflowEngine::new(Arc::new(invoker), observers, config)), sink)
}

/// A step whose action equals its name, so invoker scripts can address
/// steps individually as `svc/<name>`.
pub fn named_step(name: &str, depends_on: &[&str]) -> sb_core::StepDef {
    let mut s = step(name, depends_on);
    s.action = name.to_string();
    s
}
