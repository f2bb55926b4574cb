// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess transport — line-delimited JSON-RPC over a child's stdio.
//!
//! One envelope per line on stdin; a reader task splits stdout on
//! newlines, parses each line, and dispatches by request id. Unparseable
//! lines are logged and skipped. Process exit is fatal to the
//! connection: every pending call is rejected with `ConnectionClosed`
//! and the pool replaces the connection on the next acquire.

use crate::transport::{Transport, TransportFactory};
use crate::wire::{RpcRequest, RpcResponse};
use async_trait::async_trait;
use sb_core::OrchestratorError;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Deadline for the `initialize` handshake on a fresh connection.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Waiter = oneshot::Sender<Result<Value, OrchestratorError>>;

/// `None` once the connection is closed; registrations then fail fast.
type PendingMap = parking_lot::Mutex<Option<HashMap<u64, Waiter>>>;

/// Removes the waiter again if the caller gives up before the reply.
struct PendingSlot {
    pending: Arc<PendingMap>,
    id: u64,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        if let Some(map) = self.pending.lock().as_mut() {
            map.remove(&self.id);
        }
    }
}

/// One spawned child process speaking line-delimited JSON-RPC.
#[derive(Debug)]
pub struct SubprocessTransport {
    command: String,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    child: tokio::sync::Mutex<Option<Child>>,
    reader: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SubprocessTransport {
    /// Spawn the child and complete the `initialize` handshake.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Arc<Self>, OrchestratorError> {
        let mut child = tokio::process::Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OrchestratorError::NetworkUnavailable(format!("spawn '{command}': {e}"))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| OrchestratorError::NetworkUnavailable("child stdin missing".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::NetworkUnavailable("child stdout missing".into()))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_logger(command.to_string(), stderr);
        }

        let pending: Arc<PendingMap> = Arc::new(parking_lot::Mutex::new(Some(HashMap::new())));
        let reader = tokio::spawn(read_loop(command.to_string(), stdout, Arc::clone(&pending)));

        let transport = Arc::new(Self {
            command: command.to_string(),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            child: tokio::sync::Mutex::new(Some(child)),
            reader: parking_lot::Mutex::new(Some(reader)),
        });

        let handshake = transport.request(RpcRequest::initialize(0), CancellationToken::new());
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake).await {
            Ok(Ok(_)) => Ok(transport),
            Ok(Err(e)) => {
                transport.destroy().await;
                Err(e)
            }
            Err(_) => {
                transport.destroy().await;
                Err(OrchestratorError::Timeout(HANDSHAKE_TIMEOUT.as_millis() as u64))
            }
        }
    }

    /// Write one envelope and wait for the matching reply.
    async fn request(
        &self,
        mut request: RpcRequest,
        cancel: CancellationToken,
    ) -> Result<Value, OrchestratorError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        request.id = id;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            match pending.as_mut() {
                Some(map) => {
                    map.insert(id, tx);
                }
                None => {
                    return Err(OrchestratorError::ConnectionClosed(format!(
                        "'{}' already exited",
                        self.command
                    )))
                }
            }
        }
        let _slot = PendingSlot { pending: Arc::clone(&self.pending), id };

        let mut line = serde_json::to_string(&request)
            .map_err(|e| OrchestratorError::Validation(format!("encode request: {e}")))?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await.map_err(|e| {
                OrchestratorError::ConnectionClosed(format!("stdin write to '{}': {e}", self.command))
            })?;
            stdin.flush().await.map_err(|e| {
                OrchestratorError::ConnectionClosed(format!("stdin flush to '{}': {e}", self.command))
            })?;
        }

        tokio::select! {
            // `_slot` deregisters the waiter; a late reply is discarded.
            _ = cancel.cancelled() => Err(OrchestratorError::Cancelled("call abandoned".to_string())),
            res = rx => res.unwrap_or_else(|_| {
                Err(OrchestratorError::ConnectionClosed(format!("'{}' exited", self.command)))
            }),
        }
    }
}

#[async_trait]
impl Transport for SubprocessTransport {
    async fn send(
        &self,
        request: RpcRequest,
        cancel: CancellationToken,
    ) -> Result<Value, OrchestratorError> {
        self.request(request, cancel).await
    }

    async fn destroy(&self) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        if let Some(map) = self.pending.lock().take() {
            for (_, waiter) in map {
                let _ = waiter.send(Err(OrchestratorError::ConnectionClosed(format!(
                    "'{}' shut down",
                    self.command
                ))));
            }
        }
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
    }
}

/// Parse stdout lines and dispatch replies until EOF, then reject
/// everything still pending.
async fn read_loop(command: String, stdout: ChildStdout, pending: Arc<PendingMap>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<RpcResponse>(line) {
                    Ok(response) => {
                        let Some(id) = response.id else {
                            tracing::debug!(%command, "response without id, ignoring");
                            continue;
                        };
                        let waiter = pending.lock().as_mut().and_then(|map| map.remove(&id));
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(response.into_result());
                            }
                            None => {
                                tracing::debug!(%command, id, "reply with no waiter, discarding")
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%command, error = %e, line, "unparseable line from subprocess")
                    }
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    if let Some(map) = pending.lock().take() {
        let n = map.len();
        for (_, waiter) in map {
            let _ = waiter.send(Err(OrchestratorError::ConnectionClosed(format!(
                "'{command}' exited"
            ))));
        }
        if n > 0 {
            tracing::warn!(%command, pending = n, "subprocess exited with calls pending");
        }
    }
    tracing::info!(%command, "subprocess connection closed");
}

fn spawn_stderr_logger(command: String, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(%command, line, "subprocess stderr");
        }
    });
}

/// Factory spawning one child process per connection.
pub struct SubprocessFactory {
    command: String,
    args: Vec<String>,
}

impl SubprocessFactory {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self { command: command.into(), args }
    }
}

#[async_trait]
impl TransportFactory for SubprocessFactory {
    async fn connect(&self) -> Result<Arc<dyn Transport>, OrchestratorError> {
        let transport = SubprocessTransport::spawn(&self.command, &self.args).await?;
        Ok(transport as Arc<dyn Transport>)
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
