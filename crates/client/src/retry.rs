// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff with jitter for the client retry loop.

use rand::Rng;
use std::time::Duration;

fn default_max_retries() -> u32 {
    3
}

/// Backoff schedule for retryable transport errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Random delay inflation in `[0, jitter)` of the computed delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: Duration::from_millis(1_000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `retry` (0-based: the delay between the
    /// first failure and the second attempt is `delay(0)`).
    pub fn delay(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exp = base_ms * self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let jittered = if self.jitter > 0.0 {
            exp * (1.0 + rand::thread_rng().gen_range(0.0..1.0) * self.jitter)
        } else {
            exp
        };
        let capped = jittered.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
