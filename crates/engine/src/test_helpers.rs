// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for the engine crate.

use crate::{
    HandlerContext, HandlerError, JobEvent, JobHandler, JobManager, ManagerConfig, ManagerDeps,
    RetryPolicy,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rj_adapters::FakeConnectionProvider;
use rj_core::{Action, FakeClock, Job, JobId, JobStatus, SequentialIdGen, StateUpdate};
use rj_storage::JobStore;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) const STUB_KIND: &str = "stub";

/// Test context holding the manager and its fake adapters.
pub(crate) struct TestContext {
    pub manager: Arc<JobManager>,
    pub provider: FakeConnectionProvider,
    pub clock: FakeClock,
    pub events: EventLog,
    pub dir: TempDir,
}

impl TestContext {
    pub fn store_path(&self) -> std::path::PathBuf {
        self.dir.path().join("jobs.json")
    }

    /// A second manager over the same store and provider
    pub fn reopen(&self) -> Arc<JobManager> {
        manager_with(
            self.provider.clone(),
            self.clock.clone(),
            JobStore::new(self.store_path()),
            fast_config(),
        )
    }
}

/// Retry quickly so tests stay fast
pub(crate) fn fast_config() -> ManagerConfig {
    ManagerConfig {
        retry: RetryPolicy {
            max_attempts: Some(2),
            delay: Duration::from_millis(5),
        },
    }
}

pub(crate) fn setup() -> TestContext {
    setup_with(fast_config())
}

pub(crate) fn setup_with(config: ManagerConfig) -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeConnectionProvider::new();
    let clock = FakeClock::new();
    let manager = manager_with(
        provider.clone(),
        clock.clone(),
        JobStore::new(dir.path().join("jobs.json")),
        config,
    );
    let events = EventLog::default();
    events.attach(&manager);
    TestContext {
        manager,
        provider,
        clock,
        events,
        dir,
    }
}

fn manager_with(
    provider: FakeConnectionProvider,
    clock: FakeClock,
    store: JobStore,
    config: ManagerConfig,
) -> Arc<JobManager> {
    JobManager::new(
        ManagerDeps {
            provider: Arc::new(provider),
            store,
            clock: Arc::new(clock),
            ids: Arc::new(SequentialIdGen::default()),
        },
        config,
    )
}

/// Records every observer notification.
#[derive(Clone, Default)]
pub(crate) struct EventLog {
    inner: Arc<Mutex<Vec<(JobEvent, Job)>>>,
}

impl EventLog {
    pub fn attach(&self, manager: &JobManager) {
        let inner = Arc::clone(&self.inner);
        manager.subscribe(move |job, event| inner.lock().push((event, job.clone())));
    }

    pub fn all(&self) -> Vec<(JobEvent, Job)> {
        self.inner.lock().clone()
    }

    pub fn of(&self, kind: JobEvent) -> Vec<Job> {
        self.inner
            .lock()
            .iter()
            .filter(|(event, _)| *event == kind)
            .map(|(_, job)| job.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

/// What a [`StubHandler`] does on each `PROGRESS`
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    /// Report progress and poll again
    Working(f64),
    /// Mark the job completed
    Done,
    /// Fail with a remote error
    Broken,
    Panic,
}

/// Handler that deploys instantly and walks a scripted list of polls.
#[derive(Clone, Default)]
pub(crate) struct StubHandler {
    steps: Arc<Mutex<VecDeque<Step>>>,
    calls: Arc<Mutex<Vec<(JobId, Action)>>>,
}

impl StubHandler {
    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let handler = Self::default();
        handler.steps.lock().extend(steps);
        handler
    }

    pub fn calls(&self) -> Vec<(JobId, Action)> {
        self.calls.lock().clone()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.calls.lock().iter().map(|(_, a)| *a).collect()
    }

    fn record(&self, ctx: &HandlerContext<'_>) {
        self.calls.lock().push((ctx.id().clone(), ctx.action));
    }
}

#[async_trait]
impl JobHandler for StubHandler {
    async fn deploy(&self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        self.record(ctx);
        ctx.set_state(
            JobStatus::Running,
            StateUpdate::new().message("deployed").start_time(ctx.now_ms()),
        );
        ctx.schedule(Action::Progress);
        Ok(())
    }

    async fn progress(&self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        self.record(ctx);
        let step = self.steps.lock().pop_front().unwrap_or(Step::Done);
        match step {
            Step::Working(progress) => {
                ctx.set_state(JobStatus::Running, StateUpdate::new().progress(progress));
                ctx.schedule(Action::Progress);
            }
            Step::Done => {
                ctx.set_state(
                    JobStatus::Completed,
                    StateUpdate::new().progress(100.0).end_time(ctx.now_ms()),
                );
            }
            Step::Broken => {
                return Err(HandlerError::RemoteOutput("exploded".to_string()));
            }
            Step::Panic => panic!("stub handler panicked"),
        }
        Ok(())
    }

    async fn cancel(&self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        self.record(ctx);
        ctx.set_state(
            JobStatus::Cancelled,
            StateUpdate::new().end_time(ctx.now_ms()),
        );
        Ok(())
    }
}

/// Register `handler` as the factory for [`STUB_KIND`]
pub(crate) fn register_stub(manager: &JobManager, handler: &StubHandler) {
    let handler = handler.clone();
    manager.register(STUB_KIND, move |_job: &Job| {
        let handler: Arc<dyn JobHandler> = Arc::new(handler.clone());
        Ok(handler)
    });
}

/// Poll until `check` holds for the job or the timeout hits.
pub(crate) async fn wait_for(
    manager: &JobManager,
    id: &JobId,
    check: impl Fn(&Job) -> bool,
) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(job) = manager.get(id) {
            if check(&job) {
                return job;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting on job {id}: {:?}", manager.get(id));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub(crate) async fn wait_for_status(manager: &JobManager, id: &JobId, status: JobStatus) -> Job {
    wait_for(manager, id, |job| job.status == status).await
}
