// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single worker loop that executes queued actions

use crate::manager::JobManager;
use crate::queue::{EventQueue, EventReceiver};
use rj_core::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Consumes the event queue until it sees the shutdown sentinel.
///
/// Each dispatch runs with the manager's dispatch lock held and in its own
/// task, so a panicking handler is logged instead of ending the loop.
pub struct Worker {
    manager: Arc<JobManager>,
    receiver: EventReceiver,
}

impl Worker {
    pub(crate) fn new(manager: Arc<JobManager>, receiver: EventReceiver) -> Self {
        Self { manager, receiver }
    }

    pub async fn run(mut self) {
        tracing::info!("worker loop started");
        while let Some(event) = self.receiver.recv().await {
            if event.is_shutdown() {
                tracing::info!("shutdown requested, stopping worker loop");
                break;
            }
            self.process(event).await;
        }
        tracing::info!("worker loop stopped");
    }

    async fn process(&self, event: Event) {
        let job_id = event.job_id.clone();
        let action = event.action;
        let _guard = self.manager.dispatch_lock.lock().await;
        let manager = Arc::clone(&self.manager);
        let outcome = tokio::spawn(async move { manager.dispatch(event).await }).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(%job_id, %action, error = %e, "event dispatch failed");
            }
            Err(e) => {
                tracing::error!(%job_id, %action, error = %e, "handler task aborted");
            }
        }
    }
}

/// Handle to a running worker loop
pub struct WorkerHandle {
    join: JoinHandle<()>,
    queue: EventQueue,
}

impl WorkerHandle {
    pub(crate) fn new(join: JoinHandle<()>, queue: EventQueue) -> Self {
        Self { join, queue }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the loop to exit on its own
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "worker loop task failed");
        }
    }

    /// Enqueue the shutdown sentinel and wait up to `timeout` for the loop
    /// to drain the events ahead of it.
    ///
    /// Returns `false` if the loop was still running when the timeout hit.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.queue.push(Event::shutdown());
        match tokio::time::timeout(timeout, self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "worker loop task failed");
                true
            }
            Err(_) => {
                tracing::warn!(timeout = ?timeout, "worker loop did not stop in time");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
