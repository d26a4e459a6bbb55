// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler protocol: one implementation per job kind.

use crate::error::HandlerError;
use crate::manager::JobManager;
use async_trait::async_trait;
use rj_adapters::Connection;
use rj_core::{Action, Job, JobId, JobStatus, StateUpdate};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Everything a handler action may touch.
///
/// Handlers mutate jobs only through `set_state` and continue their state
/// machine only through `schedule`/`schedule_after`.
pub struct HandlerContext<'a> {
    pub manager: &'a JobManager,
    /// Snapshot of the job taken when the event was dequeued
    pub job: Job,
    pub action: Action,
    pub connection: Arc<dyn Connection>,
    /// Keyword payload carried by the event
    pub payload: &'a Value,
}

impl HandlerContext<'_> {
    pub fn id(&self) -> &JobId {
        &self.job.id
    }

    pub fn set_state(&self, status: JobStatus, update: StateUpdate) {
        self.manager.set_state(&self.job.id, status, update);
    }

    pub fn schedule(&self, action: Action) {
        self.manager.schedule(&self.job.id, action);
    }

    pub fn schedule_after(&self, action: Action, delay: Duration) {
        self.manager.schedule_after(&self.job.id, action, delay);
    }

    pub fn persist(&self) {
        self.manager.persist(&self.job.id);
    }

    pub fn now_ms(&self) -> u64 {
        self.manager.now_ms()
    }
}

/// Remote submission, polling, cancellation and result collection for one
/// job kind.
///
/// Actions a handler does not override fail with
/// [`HandlerError::Unsupported`].
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Prepare inputs and submit to the remote scheduler.
    async fn deploy(&self, _ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        Err(HandlerError::Unsupported(Action::Deploy))
    }

    /// Poll remote status; reschedule itself while work is outstanding.
    async fn progress(&self, _ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        Err(HandlerError::Unsupported(Action::Progress))
    }

    /// Best-effort remote termination and cleanup.
    async fn cancel(&self, _ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        Err(HandlerError::Unsupported(Action::Cancel))
    }

    /// Fetch and interpret results. Must not change the job's status.
    async fn collect(&self, _ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        Err(HandlerError::Unsupported(Action::Collect))
    }
}

/// Route `action` to the matching handler method.
pub async fn dispatch(
    handler: &dyn JobHandler,
    action: Action,
    ctx: &HandlerContext<'_>,
) -> Result<(), HandlerError> {
    match action {
        Action::Deploy => handler.deploy(ctx).await,
        Action::Progress => handler.progress(ctx).await,
        Action::Cancel => handler.cancel(ctx).await,
        Action::Collect => handler.collect(ctx).await,
        Action::Shutdown => Err(HandlerError::Unsupported(Action::Shutdown)),
    }
}
