// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced file watcher driving registry reloads.

use crate::file::parse_and_resolve;
use crate::registry::McpRegistry;
use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use sb_core::OrchestratorError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default settle time between a file event and the reload.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Read, parse, and swap the registry file in. On any failure the
/// previous map is retained and the failure is recorded.
pub fn reload_from_file(path: &Path, registry: &McpRegistry) -> Result<(), OrchestratorError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        OrchestratorError::Validation(format!("read {}: {e}", path.display()))
    })?;
    match parse_and_resolve(&content) {
        Ok(file) => {
            registry.load_file(file);
            Ok(())
        }
        Err(error) => {
            registry.record_failed_reload(&error);
            Err(error)
        }
    }
}

/// Watch `path` and reload the registry after changes settle for
/// `debounce`. The initial load happens before this returns.
///
/// The returned task owns the watcher; abort it to stop watching.
pub fn spawn_registry_watcher(
    path: PathBuf,
    registry: Arc<McpRegistry>,
    debounce: Duration,
) -> Result<tokio::task::JoinHandle<()>, OrchestratorError> {
    // First load is synchronous so callers start with a populated map.
    if let Err(error) = reload_from_file(&path, &registry) {
        tracing::warn!(path = %path.display(), %error, "initial registry load failed");
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(16);
    let mut watcher = notify::recommended_watcher(move |res: Result<NotifyEvent, _>| {
        if let Ok(event) = res {
            if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                let _ = tx.blocking_send(());
            }
        }
    })
    .map_err(|e| OrchestratorError::Validation(format!("file watcher: {e}")))?;

    // Watch the parent so truncate-and-rename rewrites are seen too.
    let watch_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.clone());
    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .map_err(|e| OrchestratorError::Validation(format!("watch {}: {e}", watch_dir.display())))?;

    Ok(tokio::spawn(async move {
        // Owned here so the watcher lives as long as the task.
        let _watcher = watcher;
        while rx.recv().await.is_some() {
            // Debounce: wait for the burst to settle, then drain it.
            tokio::time::sleep(debounce).await;
            while rx.try_recv().is_ok() {}
            let _ = reload_from_file(&path, &registry);
        }
    }))
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
