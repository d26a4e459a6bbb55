// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job manager: registry, connections, persistence and dispatch

use crate::error::{HandlerError, ManagerError};
use crate::handler::{self, HandlerContext, JobHandler};
use crate::observer::{JobEvent, ObserverBus};
use crate::queue::{self, EventQueue, EventReceiver};
use crate::registry::{HandlerRegistry, ManagedJob};
use crate::worker::{Worker, WorkerHandle};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rj_adapters::{Connection, ConnectionError, ConnectionProvider};
use rj_core::{Action, Clock, Event, Host, IdGen, Job, JobId, JobStatus, StateUpdate};
use rj_storage::JobStore;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// How transient transport failures are retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts before the job is failed. `None` retries forever.
    pub max_attempts: Option<u32>,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagerConfig {
    pub retry: RetryPolicy,
}

/// Adapter dependencies for the manager
pub struct ManagerDeps {
    pub provider: Arc<dyn ConnectionProvider>,
    pub store: JobStore,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGen>,
}

/// Owns every job in the process.
///
/// Status mutations go through [`JobManager::set_state`]; action execution
/// goes through the queue and the single worker loop started by
/// [`JobManager::start`].
pub struct JobManager {
    jobs: Mutex<IndexMap<JobId, ManagedJob>>,
    handlers: HandlerRegistry,
    observers: ObserverBus,
    queue: EventQueue,
    receiver: Mutex<Option<EventReceiver>>,
    /// Held for the whole of one dispatch
    pub(crate) dispatch_lock: tokio::sync::Mutex<()>,
    provider: Arc<dyn ConnectionProvider>,
    connections: Mutex<HashMap<String, Arc<dyn Connection>>>,
    retries: Mutex<HashMap<JobId, u32>>,
    store: JobStore,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
    config: ManagerConfig,
}

impl JobManager {
    pub fn new(deps: ManagerDeps, config: ManagerConfig) -> Arc<Self> {
        let (queue, receiver) = queue::channel();
        Arc::new(Self {
            jobs: Mutex::new(IndexMap::new()),
            handlers: HandlerRegistry::new(),
            observers: ObserverBus::new(),
            queue,
            receiver: Mutex::new(Some(receiver)),
            dispatch_lock: tokio::sync::Mutex::new(()),
            provider: deps.provider,
            connections: Mutex::new(HashMap::new()),
            retries: Mutex::new(HashMap::new()),
            store: deps.store,
            clock: deps.clock,
            ids: deps.ids,
            config,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Register the handler factory for a job kind
    pub fn register<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Job) -> Result<Arc<dyn JobHandler>, HandlerError> + Send + Sync + 'static,
    {
        self.handlers.register(kind, factory);
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Subscribe to lifecycle notifications
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&Job, JobEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer);
    }

    // -- registry --

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.lock().get(id).map(|m| m.job.clone())
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.lock().contains_key(id)
    }

    /// Snapshot of all jobs in insertion order
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().values().map(|m| m.job.clone()).collect()
    }

    pub fn is_mounted(&self, id: &JobId) -> bool {
        self.jobs.lock().get(id).is_some_and(ManagedJob::is_mounted)
    }

    /// Add a job to the registry. Returns `false` if the id is already
    /// managed, in which case nothing changes.
    pub fn manage(&self, managed: impl Into<ManagedJob>) -> bool {
        let managed = managed.into();
        let snapshot = managed.job.clone();
        {
            let mut jobs = self.jobs.lock();
            if jobs.contains_key(&snapshot.id) {
                return false;
            }
            jobs.insert(snapshot.id.clone(), managed);
        }
        tracing::info!(job_id = %snapshot.id, kind = %snapshot.kind, status = %snapshot.status, "job managed");
        self.observers.notify(&snapshot, JobEvent::Managed);
        true
    }

    /// Create, manage and persist a new job, then schedule its deploy.
    pub fn create(
        &self,
        kind: &str,
        host: Host,
        details: Map<String, Value>,
    ) -> Result<JobId, ManagerError> {
        if !self.handlers.is_registered(kind) {
            return Err(ManagerError::UnknownKind(kind.to_string()));
        }
        let id = JobId::new(self.ids.next());
        let job = Job::new(id.clone(), kind, host).with_details(details);
        let managed = self.mount(job)?;
        self.manage(managed);
        self.persist(&id);
        self.schedule(&id, Action::Deploy);
        Ok(id)
    }

    /// Apply a status change plus field updates, then notify observers.
    ///
    /// Unknown ids are logged and ignored.
    pub fn set_state(&self, id: &JobId, status: JobStatus, update: StateUpdate) {
        let snapshot = {
            let mut jobs = self.jobs.lock();
            let Some(managed) = jobs.get_mut(id) else {
                tracing::info!(job_id = %id, %status, "set_state for unknown job, ignoring");
                return;
            };
            managed.job.apply(status, update);
            managed.job.clone()
        };
        tracing::debug!(
            job_id = %id,
            status = %snapshot.status,
            progress = snapshot.progress,
            "job modified"
        );
        self.observers.notify(&snapshot, JobEvent::Modified);
    }

    /// Drop a job from the registry and from disk.
    pub fn remove(&self, id: &JobId) -> bool {
        let removed = self.jobs.lock().shift_remove(id);
        let Some(managed) = removed else {
            tracing::info!(job_id = %id, "remove for unknown job, ignoring");
            return false;
        };
        self.retries.lock().remove(id);
        if let Err(e) = self.store.remove(id) {
            tracing::warn!(job_id = %id, error = %e, "failed to remove persisted job");
        }
        tracing::info!(job_id = %id, "job removed");
        self.observers.notify(&managed.job, JobEvent::Deleted);
        true
    }

    // -- queue --

    pub fn schedule(&self, id: &JobId, action: Action) {
        self.queue.push(Event::new(id.clone(), action));
    }

    /// Enqueue `action` once `delay` has elapsed
    pub fn schedule_after(&self, id: &JobId, action: Action, delay: Duration) {
        self.queue.push_after(Event::new(id.clone(), action), delay);
    }

    pub fn cancel(&self, id: &JobId) {
        self.schedule(id, Action::Cancel);
    }

    /// Ask the worker loop to stop after the events already queued
    pub fn shutdown(&self) {
        self.queue.push(Event::shutdown());
    }

    /// Spawn the worker loop. May be called once.
    pub fn start(self: &Arc<Self>) -> Result<WorkerHandle, ManagerError> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(ManagerError::AlreadyStarted)?;
        let worker = Worker::new(Arc::clone(self), receiver);
        let join = tokio::spawn(worker.run());
        Ok(WorkerHandle::new(join, self.queue.clone()))
    }

    // -- persistence --

    /// Write the job's current state to disk. Failures are logged and the
    /// write is skipped.
    pub fn persist(&self, id: &JobId) {
        let Some(job) = self.get(id) else {
            tracing::info!(job_id = %id, "persist for unknown job, ignoring");
            return;
        };
        if let Err(e) = self.store.persist(&job) {
            tracing::warn!(job_id = %id, error = %e, "failed to persist job, skipping");
        }
    }

    /// Manage every job found on disk, without handlers.
    ///
    /// Returns the number of jobs newly added.
    pub fn load_jobs(&self) -> usize {
        let mut loaded = 0;
        for (id, record) in self.store.load() {
            if self.manage(ManagedJob::bare(record.into_job(id))) {
                loaded += 1;
            }
        }
        tracing::info!(loaded, path = %self.store.path().display(), "loaded persisted jobs");
        loaded
    }

    // -- connections --

    /// Cached connection for `host`, opening one on first use
    pub async fn connection(&self, host: &Host) -> Result<Arc<dyn Connection>, ConnectionError> {
        let key = host.connection_key();
        let cached = self.connections.lock().get(&key).cloned();
        if let Some(conn) = cached {
            return Ok(conn);
        }
        let conn = self.provider.connect(host).await?;
        self.connections.lock().insert(key, Arc::clone(&conn));
        Ok(conn)
    }

    /// Forget the cached connection so the next use reconnects
    pub fn drop_connection(&self, host: &Host) {
        if self.connections.lock().remove(&host.connection_key()).is_some() {
            tracing::debug!(host = %host, "dropped cached connection");
        }
    }

    // -- resume --

    /// Build a handler for `job` from its kind's factory
    pub fn mount(&self, job: Job) -> Result<ManagedJob, ManagerError> {
        let id = job.id.clone();
        let kind = job.kind.clone();
        self.handlers.mount(job).map_err(|source| {
            tracing::error!(job_id = %id, %kind, error = %source, "failed to mount job");
            ManagerError::Mount { id, kind, source }
        })
    }

    /// Reconnect, re-mount, and continue a job that was loaded from disk.
    ///
    /// - `IDLE` jobs that never started move to `PENDING` and get a
    ///   `DEPLOY` scheduled
    /// - other `IDLE` jobs move to `RUNNING` and get a `PROGRESS` scheduled
    /// - `RUNNING` and `RETRYING` jobs get a `PROGRESS` scheduled, unless
    ///   they were already mounted and so already have an event in flight
    /// - everything else is re-mounted only
    ///
    /// A credential failure moves the job to `IDLE` and is not an error.
    pub async fn resume(&self, id: &JobId) -> Result<(), ManagerError> {
        let Some(job) = self.get(id) else {
            tracing::info!(job_id = %id, "resume for unknown job, ignoring");
            return Ok(());
        };
        let was_mounted = self.is_mounted(id);

        match self.connection(&job.host).await {
            Ok(_) => {}
            Err(e) if e.is_credential() => {
                tracing::warn!(job_id = %id, error = %e, "resume blocked on credentials");
                self.set_state(
                    id,
                    JobStatus::Idle,
                    StateUpdate::new()
                        .message("waiting for credentials")
                        .traceback("resume", e.to_string()),
                );
                self.persist(id);
                return Ok(());
            }
            Err(e) => return Err(ManagerError::Connection(e)),
        }

        if !was_mounted {
            self.attach(job.clone())?;
        }

        match job.status {
            JobStatus::Idle if job.start_time.is_none() => {
                self.set_state(id, JobStatus::Pending, StateUpdate::new().message("redeploying"));
                self.persist(id);
                self.schedule(id, Action::Deploy);
            }
            JobStatus::Idle => {
                self.set_state(id, JobStatus::Running, StateUpdate::new().message("resumed"));
                self.persist(id);
                self.schedule(id, Action::Progress);
            }
            JobStatus::Running | JobStatus::Retrying if !was_mounted => {
                self.schedule(id, Action::Progress)
            }
            _ => {}
        }
        tracing::info!(job_id = %id, status = %job.status, was_mounted, "job resumed");
        Ok(())
    }

    /// Mount `job` and install its handler on the registry entry
    fn attach(&self, job: Job) -> Result<(), ManagerError> {
        let id = job.id.clone();
        let mounted = self.mount(job)?;
        if let Some(handler) = mounted.handler {
            if let Some(entry) = self.jobs.lock().get_mut(&id) {
                entry.handler = Some(handler);
            }
        }
        Ok(())
    }

    /// Mount every loaded job and resume the ones with remote work.
    ///
    /// Terminal and `GHOST` jobs are mounted without connecting, so they
    /// can still be collected or cancelled. A job whose resume fails is
    /// forced to `IDLE` with the failure in its traceback.
    pub async fn resume_all(&self) {
        let (resumable, settled): (Vec<Job>, Vec<Job>) = self
            .jobs()
            .into_iter()
            .partition(|job| is_resumable(job.status));
        for job in settled {
            if self.is_mounted(&job.id) {
                continue;
            }
            let id = job.id.clone();
            if let Err(e) = self.attach(job) {
                tracing::warn!(job_id = %id, error = %e, "could not mount settled job");
            }
        }
        for id in resumable.into_iter().map(|job| job.id) {
            if let Err(e) = self.resume(&id).await {
                tracing::warn!(job_id = %id, error = %e, "resume failed, job set idle");
                self.set_state(
                    &id,
                    JobStatus::Idle,
                    StateUpdate::new()
                        .message("resume failed")
                        .traceback("resume", e.to_string()),
                );
                self.persist(&id);
            }
        }
    }

    // -- dispatch --

    /// Run one action against one job.
    ///
    /// Events for unknown or terminal jobs are dropped. Handler failures
    /// are applied to the job's state here and returned for logging.
    pub(crate) async fn dispatch(&self, event: Event) -> Result<(), ManagerError> {
        let entry = self.jobs.lock().get(&event.job_id).cloned();
        let Some(ManagedJob { job, handler }) = entry else {
            tracing::info!(job_id = %event.job_id, action = %event.action, "event for unknown job, dropping");
            return Ok(());
        };
        if job.is_terminal() {
            tracing::debug!(job_id = %job.id, status = %job.status, action = %event.action, "job is terminal, dropping event");
            return Ok(());
        }
        let Some(handler) = handler else {
            tracing::warn!(job_id = %job.id, action = %event.action, "job has no handler, resume it first");
            return Err(ManagerError::Unmounted { id: job.id });
        };
        self.run_action(job, handler.as_ref(), event.action, &event.payload)
            .await
    }

    /// Run `COLLECT` for a job directly, bypassing the queue.
    ///
    /// Serialized with the worker loop. Terminal jobs are allowed.
    pub async fn collect(&self, id: &JobId) -> Result<(), ManagerError> {
        let _guard = self.dispatch_lock.lock().await;
        let entry = self.jobs.lock().get(id).cloned();
        let Some(ManagedJob { job, handler }) = entry else {
            tracing::info!(job_id = %id, "collect for unknown job, ignoring");
            return Ok(());
        };
        let handler = handler.ok_or_else(|| ManagerError::Unmounted { id: id.clone() })?;
        self.run_action(job, handler.as_ref(), Action::Collect, &Value::Null)
            .await
    }

    async fn run_action(
        &self,
        job: Job,
        handler: &dyn JobHandler,
        action: Action,
        payload: &Value,
    ) -> Result<(), ManagerError> {
        let id = job.id.clone();
        let result = match self.connection(&job.host).await {
            Ok(connection) => {
                let ctx = HandlerContext {
                    manager: self,
                    job,
                    action,
                    connection,
                    payload,
                };
                tracing::debug!(job_id = %id, %action, "dispatching");
                handler::dispatch(handler, action, &ctx).await
            }
            Err(e) => Err(HandlerError::Connection(e)),
        };

        match result {
            Ok(()) => {
                if self.get(&id).is_some_and(|j| j.status != JobStatus::Retrying) {
                    self.retries.lock().remove(&id);
                }
                Ok(())
            }
            Err(source) => {
                self.apply_failure(&id, action, &source);
                Err(ManagerError::Handler { id, action, source })
            }
        }
    }

    /// Move a job to the state its failure calls for.
    ///
    /// - `COLLECT` failures only record a traceback
    /// - `CANCEL` transport failures leave the job `GHOST`
    /// - credential failures leave the job `IDLE`
    /// - other transport failures are retried, then failed
    /// - anything else fails the job
    fn apply_failure(&self, id: &JobId, action: Action, error: &HandlerError) {
        let Some(job) = self.get(id) else {
            return;
        };
        let key = action.as_str().to_lowercase();
        let text = error.to_string();

        if let Some(conn_err) = error.connection_error() {
            self.drop_connection(&job.host);
            if action == Action::Collect {
                self.set_state(id, job.status, StateUpdate::new().traceback(key, text));
            } else if action == Action::Cancel {
                self.set_state(
                    id,
                    JobStatus::Ghost,
                    StateUpdate::new()
                        .message("remote state unknown after failed cancel")
                        .traceback(key, text),
                );
            } else if conn_err.is_credential() {
                self.set_state(
                    id,
                    JobStatus::Idle,
                    StateUpdate::new()
                        .message("waiting for credentials")
                        .traceback("connection", text),
                );
            } else {
                self.retry(id, action, &text);
            }
            self.persist(id);
            return;
        }

        match error {
            HandlerError::Unsupported(_) => {}
            _ if action == Action::Collect => {
                self.set_state(id, job.status, StateUpdate::new().traceback(key, text));
                self.persist(id);
            }
            _ => {
                self.set_state(
                    id,
                    JobStatus::Failed,
                    StateUpdate::new()
                        .message(format!("{action} failed"))
                        .traceback(key, text)
                        .end_time(self.now_ms()),
                );
                self.persist(id);
            }
        }
    }

    /// Count one transient failure, then retry `action` later or fail the
    /// job once the policy's bound is exceeded.
    pub fn retry(&self, id: &JobId, action: Action, reason: &str) -> JobStatus {
        let attempt = {
            let mut retries = self.retries.lock();
            let count = retries.entry(id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let policy = &self.config.retry;
        if let Some(max) = policy.max_attempts.filter(|max| attempt > *max) {
            self.retries.lock().remove(id);
            tracing::warn!(job_id = %id, %action, attempts = max, "retries exhausted, failing job");
            self.set_state(
                id,
                JobStatus::Failed,
                StateUpdate::new()
                    .message(format!("gave up after {max} retries"))
                    .traceback("retry", reason)
                    .end_time(self.now_ms()),
            );
            return JobStatus::Failed;
        }
        tracing::info!(job_id = %id, %action, attempt, delay = ?policy.delay, "retrying after transport failure");
        self.set_state(
            id,
            JobStatus::Retrying,
            StateUpdate::new()
                .message(format!("retry {attempt} after: {reason}"))
                .traceback("retry", reason),
        );
        self.schedule_after(id, action, policy.delay);
        JobStatus::Retrying
    }

    /// Transient failures counted since the job's last successful action
    pub fn retry_count(&self, id: &JobId) -> u32 {
        self.retries.lock().get(id).copied().unwrap_or(0)
    }
}

fn is_resumable(status: JobStatus) -> bool {
    matches!(
        status,
        JobStatus::Pending
            | JobStatus::Deploying
            | JobStatus::Running
            | JobStatus::Retrying
            | JobStatus::Idle
    )
}

#[cfg(test)]
#[path = "manager_tests/mod.rs"]
mod tests;
