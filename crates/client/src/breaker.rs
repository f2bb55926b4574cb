// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker — fail fast once a downstream is judged unhealthy.
//!
//! State machine per service: `Closed` → `Open` on `failure_threshold`
//! consecutive failures within the monitoring window; `Open` →
//! `HalfOpen` when the first call arrives at or after `next_attempt`
//! (that call runs as a probe); probe success closes the breaker, probe
//! failure re-opens it with a fresh `next_attempt`.

use parking_lot::Mutex;
use sb_core::{BreakerConfig, BreakerState, Clock, Event, Observers, OrchestratorError};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot of breaker state for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub window_successes: u64,
    pub window_failures: u64,
    /// Milliseconds until the next probe is allowed, when open.
    pub retry_in_ms: Option<u64>,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    window_successes: u64,
    window_failures: u64,
    next_attempt: Option<Instant>,
}

/// Failure-isolation state machine for one downstream service.
pub struct CircuitBreaker<C: Clock> {
    mcp: String,
    config: BreakerConfig,
    clock: C,
    observers: Observers,
    inner: Mutex<BreakerInner>,
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(
        mcp: impl Into<String>,
        config: BreakerConfig,
        clock: C,
        observers: Observers,
    ) -> Self {
        Self {
            mcp: mcp.into(),
            config,
            clock,
            observers,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                window_successes: 0,
                window_failures: 0,
                next_attempt: None,
            }),
        }
    }

    /// Run `call` under the breaker's rules.
    ///
    /// Fails fast with [`OrchestratorError::CircuitOpen`] while open; the
    /// future is dropped unpolled, so the transport is never touched.
    pub async fn execute<T>(
        &self,
        call: impl Future<Output = Result<T, OrchestratorError>>,
    ) -> Result<T, OrchestratorError> {
        self.check_admission()?;
        let result = call.await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    /// Reject while open; transition to half-open once `next_attempt` is due.
    fn check_admission(&self) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let due = inner
                    .next_attempt
                    .map(|at| self.clock.now() >= at)
                    .unwrap_or(true);
                if due {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    Ok(())
                } else {
                    Err(OrchestratorError::CircuitOpen(self.mcp.clone()))
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.window_successes += 1;
        inner.consecutive_failures = 0;
        if inner.state == BreakerState::HalfOpen {
            inner.next_attempt = None;
            self.transition(&mut inner, BreakerState::Closed);
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.window_failures += 1;
        inner.consecutive_failures += 1;
        match inner.state {
            // A failed probe re-opens immediately.
            BreakerState::HalfOpen => self.open(&mut inner),
            BreakerState::Closed
                if inner.consecutive_failures >= self.config.failure_threshold =>
            {
                self.open(&mut inner)
            }
            _ => {}
        }
    }

    fn open(&self, inner: &mut BreakerInner) {
        inner.next_attempt =
            Some(self.clock.now() + Duration::from_millis(self.config.reset_timeout_ms));
        self.transition(inner, BreakerState::Open);
    }

    /// Manually open the breaker.
    pub fn trip(&self) {
        let mut inner = self.inner.lock();
        self.open(&mut inner);
    }

    /// Manually close the breaker and clear counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.window_successes = 0;
        inner.window_failures = 0;
        inner.next_attempt = None;
        self.transition(&mut inner, BreakerState::Closed);
    }

    /// Reset the rolling window counters. Called by the monitoring tick;
    /// the window is replaced, not slid.
    pub fn roll_window(&self) {
        let mut inner = self.inner.lock();
        inner.window_successes = 0;
        inner.window_failures = 0;
        inner.consecutive_failures = 0;
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock();
        let retry_in_ms = match inner.state {
            BreakerState::Open => inner.next_attempt.map(|at| {
                at.saturating_duration_since(self.clock.now()).as_millis() as u64
            }),
            _ => None,
        };
        BreakerStatus {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            window_successes: inner.window_successes,
            window_failures: inner.window_failures,
            retry_in_ms,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        tracing::info!(mcp = %self.mcp, %from, %to, "circuit breaker state change");
        self.observers.emit(Event::CircuitStateChange { mcp: self.mcp.clone(), from, to });
    }
}

/// Spawn the background tick that rolls the monitoring window.
pub fn spawn_window_tick<C: Clock>(
    breaker: Arc<CircuitBreaker<C>>,
) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_millis(breaker.config.monitoring_period_ms.max(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the first
        // window gets a full period.
        tick.tick().await;
        loop {
            tick.tick().await;
            breaker.roll_window();
        }
    })
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
