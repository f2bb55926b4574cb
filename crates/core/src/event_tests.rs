// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;

#[test]
fn events_serialize_with_type_tag() {
    let event = Event::StepCompleted { run_id: RunId::new("wfr-1"), step: "build".into() };
    let v = serde_json::to_value(&event).unwrap();
    assert_eq!(v["type"], "step:completed");
    assert_eq!(v["step"], "build");
    assert_eq!(v["run_id"], "wfr-1");
}

#[test]
fn events_deserialize_from_type_tag() {
    let json = r#"{"type":"mcps_added_bad"}"#;
    assert!(serde_json::from_str::<Event>(json).is_err());

    let json = r#"{"type":"mcps:added","names":["x"]}"#;
    let event: Event = serde_json::from_str(json).unwrap();
    assert_eq!(event, Event::McpsAdded { names: vec!["x".into()] });
}

#[test]
fn name_matches_serialized_tag() {
    let event = Event::CircuitStateChange {
        mcp: "search".into(),
        from: BreakerState::Closed,
        to: BreakerState::Open,
    };
    let v = serde_json::to_value(&event).unwrap();
    assert_eq!(v["type"], event.name());
}

#[test]
fn fanout_dispatches_in_subscription_order() {
    let observers = Observers::new();
    let first = CollectingObserver::new();
    let second = CollectingObserver::new();
    observers.subscribe(Arc::new(first.clone()));
    observers.subscribe(Arc::new(second.clone()));

    observers.emit(Event::Heartbeat { active_workflows: 1, running_steps: 2, epoch_ms: 3 });

    assert_eq!(first.names(), vec!["heartbeat"]);
    assert_eq!(second.names(), vec!["heartbeat"]);
}

#[test]
fn fanout_clones_share_subscribers() {
    let observers = Observers::new();
    let cloned = observers.clone();
    let sink = CollectingObserver::new();
    cloned.subscribe(Arc::new(sink.clone()));

    observers.emit(Event::McpsRemoved { names: vec!["a".into()] });

    assert_eq!(sink.events().len(), 1);
    assert!(!observers.is_empty());
}
