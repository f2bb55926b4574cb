// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded connection pool with FIFO waiters.
//!
//! `acquire` hands out an idle connection, constructs a new one while
//! below `max_size`, or queues the caller. `release` hands the
//! connection to the oldest live waiter or parks it idle. A periodic
//! sweep destroys connections idle past `idle_timeout`, never dropping
//! the pool below `min_size`.

use crate::transport::{Transport, TransportFactory};
use parking_lot::Mutex;
use sb_core::OrchestratorError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Pool sizing and timing limits.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 4,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

struct IdleConn {
    conn: Arc<dyn Transport>,
    last_used: Instant,
}

struct PoolInner {
    idle: Vec<IdleConn>,
    /// Constructed connections: idle + handed out + mid-construction.
    total: usize,
    waiters: VecDeque<oneshot::Sender<Arc<dyn Transport>>>,
    shut_down: bool,
}

/// Bounded pool of connections to one downstream service.
pub struct ConnectionPool {
    factory: Arc<dyn TransportFactory>,
    config: PoolConfig,
    inner: Mutex<PoolInner>,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn TransportFactory>, config: PoolConfig) -> Self {
        Self {
            factory,
            config,
            inner: Mutex::new(PoolInner {
                idle: Vec::new(),
                total: 0,
                waiters: VecDeque::new(),
                shut_down: false,
            }),
        }
    }

    /// Get a connection: idle first, then construct, then wait FIFO.
    pub async fn acquire(&self) -> Result<Arc<dyn Transport>, OrchestratorError> {
        let waiter = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return Err(OrchestratorError::PoolShutdown);
            }
            if let Some(idle) = inner.idle.pop() {
                return Ok(idle.conn);
            }
            if inner.total < self.config.max_size {
                inner.total += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push_back(tx);
                Some(rx)
            }
        };

        match waiter {
            None => match self.factory.connect().await {
                Ok(conn) => Ok(conn),
                Err(e) => {
                    self.inner.lock().total -= 1;
                    Err(e)
                }
            },
            Some(rx) => match tokio::time::timeout(self.config.acquire_timeout, rx).await {
                Ok(Ok(conn)) => Ok(conn),
                // Sender dropped: the pool shut down underneath us.
                Ok(Err(_)) => Err(OrchestratorError::PoolShutdown),
                Err(_) => {
                    Err(OrchestratorError::Timeout(self.config.acquire_timeout.as_millis() as u64))
                }
            },
        }
    }

    /// Return a healthy connection: oldest live waiter first, else idle.
    pub fn release(&self, conn: Arc<dyn Transport>) {
        let leftover = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                inner.total -= 1;
                Some(conn)
            } else {
                let mut conn = conn;
                loop {
                    match inner.waiters.pop_front() {
                        Some(waiter) => match waiter.send(conn) {
                            Ok(()) => break None,
                            // Waiter timed out; try the next one.
                            Err(rejected) => conn = rejected,
                        },
                        None => {
                            inner.idle.push(IdleConn { conn, last_used: Instant::now() });
                            break None;
                        }
                    }
                }
            }
        };
        if let Some(conn) = leftover {
            tokio::spawn(async move { conn.destroy().await });
        }
    }

    /// Drop a dead connection. Frees its capacity; if a waiter is queued,
    /// a replacement is constructed for it so it does not starve.
    pub async fn discard(&self, conn: Arc<dyn Transport>) {
        conn.destroy().await;
        let replace_for_waiter = {
            let mut inner = self.inner.lock();
            inner.total -= 1;
            if !inner.shut_down && !inner.waiters.is_empty() {
                inner.total += 1;
                true
            } else {
                false
            }
        };
        if replace_for_waiter {
            match self.factory.connect().await {
                Ok(conn) => self.release(conn),
                Err(e) => {
                    tracing::warn!(error = %e, "replacement connection failed");
                    self.inner.lock().total -= 1;
                }
            }
        }
    }

    /// Construct connections until `min_size` exist. Best-effort.
    pub async fn warm(&self) {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.shut_down || inner.total >= self.config.min_size {
                    return;
                }
                inner.total += 1;
            }
            match self.factory.connect().await {
                Ok(conn) => self.release(conn),
                Err(e) => {
                    tracing::debug!(error = %e, "pool warm-up connect failed");
                    self.inner.lock().total -= 1;
                    return;
                }
            }
        }
    }

    /// Destroy idle connections unused past `idle_timeout`, keeping at
    /// least `min_size` connections alive.
    pub async fn sweep_idle(&self) {
        let expired = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let now = Instant::now();
            let total = inner.total;
            let mut expired = Vec::new();
            let mut kept = Vec::new();
            for idle in inner.idle.drain(..) {
                let stale = now.duration_since(idle.last_used) > self.config.idle_timeout;
                if stale && total - expired.len() > self.config.min_size {
                    expired.push(idle.conn);
                } else {
                    kept.push(idle);
                }
            }
            inner.idle = kept;
            inner.total -= expired.len();
            expired
        };
        for conn in expired {
            conn.destroy().await;
        }
    }

    /// Tear everything down; queued waiters are rejected with
    /// `PoolShutdown` and in-use connections are destroyed on release.
    pub async fn shutdown(&self) {
        let (idle, waiters) = {
            let mut inner = self.inner.lock();
            inner.shut_down = true;
            inner.total -= inner.idle.len();
            (std::mem::take(&mut inner.idle), std::mem::take(&mut inner.waiters))
        };
        // Dropping the senders rejects every queued waiter.
        drop(waiters);
        for idle in idle {
            idle.conn.destroy().await;
        }
    }

    /// Connections currently constructed (idle + handed out).
    pub fn size(&self) -> usize {
        self.inner.lock().total
    }

    pub fn idle_count(&self) -> usize {
        self.inner.lock().idle.len()
    }
}

/// Spawn the periodic idle sweep for `pool`.
pub fn spawn_idle_sweep(pool: Arc<ConnectionPool>) -> tokio::task::JoinHandle<()> {
    let period = pool.config.idle_timeout.max(Duration::from_millis(100)) / 2;
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tick.tick().await;
        loop {
            tick.tick().await;
            pool.sweep_idle().await;
        }
    })
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
