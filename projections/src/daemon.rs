//! The polling daemon driving projections forward.
//!
//! A single background task, spawned from [`ProjectionDaemon::start`] and
//! stopped through the returned handle. Each tick:
//!
//! 1. snapshot the registered projection names;
//! 2. read everything past the minimum checkpoint with `Query::all()`;
//! 3. feed the events to the manager in chunks of the configured batch
//!    size;
//! 4. sleep the polling interval.
//!
//! One tick runs at a time; there is no attempt to drain faster than the
//! interval (chunking bounds per-tick memory instead). Cancellation is
//! honored at every await — a mid-tick stop abandons the remaining chunks,
//! which is safe because checkpoints only ever advance.

use crate::manager::ProjectionManager;
use sequent_core::{Cancellation, CancellationSource, Query, ReadOptions, Result, StoreError};
use std::sync::Arc;

/// Factory for the polling task.
#[derive(Debug)]
pub struct ProjectionDaemon {
    manager: Arc<ProjectionManager>,
}

/// A running daemon; dropping it without [`DaemonHandle::stop`] aborts the
/// task at its next await.
#[derive(Debug)]
pub struct DaemonHandle {
    cancel: CancellationSource,
    task: tokio::task::JoinHandle<()>,
}

impl DaemonHandle {
    /// Request shutdown and wait for the in-flight tick to wind down.
    pub async fn stop(self) {
        self.cancel.cancel();
        // The task only ends by observing the token, so join errors mean
        // it panicked; surface that to the test runner / caller.
        if let Err(error) = self.task.await {
            if error.is_panic() {
                std::panic::resume_unwind(error.into_panic());
            }
        }
    }
}

impl ProjectionDaemon {
    /// Create a daemon over `manager`.
    #[must_use]
    pub const fn new(manager: Arc<ProjectionManager>) -> Self {
        Self { manager }
    }

    /// Spawn the polling loop. The loop waits one polling interval before
    /// its first tick (startup delay), optionally auto-rebuilding
    /// never-bootstrapped projections first.
    #[must_use]
    pub fn start(&self) -> DaemonHandle {
        let manager = Arc::clone(&self.manager);
        let cancel = CancellationSource::new();
        let token = cancel.token();
        let task = tokio::spawn(async move {
            run(manager, token).await;
        });
        DaemonHandle { cancel, task }
    }
}

async fn run(manager: Arc<ProjectionManager>, cancel: Cancellation) {
    let interval = manager.settings().polling_interval;

    if manager.settings().enable_auto_rebuild {
        match manager.rebuild_all(false, &cancel).await {
            Ok(result) => tracing::info!(
                projections = result.details.len(),
                duration = ?result.duration,
                "auto-rebuild complete"
            ),
            Err(StoreError::Cancelled) => return,
            Err(error) => {
                tracing::error!(error = %error, "auto-rebuild failed");
            }
        }
    }

    loop {
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = cancel.cancelled() => return,
        }

        match tick(&manager, &cancel).await {
            Ok(processed) => {
                if processed > 0 {
                    tracing::debug!(events = processed, "projection tick complete");
                }
            }
            Err(StoreError::Cancelled) => return,
            Err(error) => {
                // A failing tick must not kill the daemon; the next tick
                // retries from the unchanged checkpoints.
                tracing::error!(error = %error, "projection tick failed");
            }
        }
    }
}

/// One polling pass; returns the number of events handed to the manager.
async fn tick(manager: &ProjectionManager, cancel: &Cancellation) -> Result<usize> {
    if manager.names().is_empty() {
        return Ok(0);
    }

    let from = manager.min_checkpoint().await?;
    let events = manager
        .event_store()
        .read(Query::all(), ReadOptions::new(), Some(from), cancel.clone())
        .await?;
    if events.is_empty() {
        return Ok(0);
    }

    let batch_size = manager.settings().batch_size;
    for chunk in events.chunks(batch_size) {
        cancel.check()?;
        manager.update(chunk, cancel).await?;
    }
    Ok(events.len())
}
