// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use rj_adapters::{
    ConnectionProvider, SchedulerStatus, SlurmStatus, SshProvider, TracedProvider,
};
use rj_core::{JobId, SystemClock, UuidIdGen};
use rj_engine::{BatchHandler, JobManager, ManagerDeps, ManagerError, WorkerHandle, BATCH_KIND};
use rj_storage::JobStore;
use thiserror::Error;
use tracing::{info, warn};

use crate::jobfile::JobFile;
use crate::settings::Settings;

/// How long shutdown waits for the in-flight action to finish
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/rj)
    pub state_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to the persisted job document
    pub jobs_path: PathBuf,
    /// Path to the optional settings file
    pub config_path: PathBuf,
    pub settings: Settings,
}

impl Config {
    /// Load configuration for the user-level daemon.
    ///
    /// Uses fixed paths under `~/.local/state/rj/` (or `$XDG_STATE_HOME/rj/`).
    pub fn load() -> Result<Self, LifecycleError> {
        let config = Self::in_dir(crate::env::state_dir()?)?;
        Ok(Self {
            settings: config.settings.clone().with_env_overrides(),
            ..config
        })
    }

    /// Configuration rooted at `state_dir`, reading `config.toml` if present
    pub fn in_dir(state_dir: PathBuf) -> Result<Self, LifecycleError> {
        let config_path = state_dir.join("config.toml");
        let settings = match std::fs::read_to_string(&config_path) {
            Ok(text) => Settings::parse(&text).map_err(|source| LifecycleError::Config {
                path: config_path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(LifecycleError::Io(e)),
        };

        Ok(Self {
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            jobs_path: state_dir.join("jobs.json"),
            config_path,
            settings,
            state_dir,
        })
    }
}

/// Daemon state during operation.
pub struct DaemonState {
    /// Configuration
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub manager: Arc<JobManager>,
    worker: WorkerHandle,
}

impl DaemonState {
    /// Create a job from a job file and schedule its deploy
    pub fn submit(&self, job: JobFile) -> Result<JobId, LifecycleError> {
        let id = self.manager.create(&job.kind, job.host, job.details)?;
        info!(job_id = %id, kind = %job.kind, "submitted job");
        Ok(id)
    }

    /// Stop the worker loop and release the lock.
    ///
    /// Remote jobs keep running; the next startup resumes them from disk.
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        if !self.worker.shutdown(SHUTDOWN_TIMEOUT).await {
            warn!("worker loop still busy at shutdown, exiting anyway");
        }

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        // Lock file is released when self.lock_file is dropped
        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Invalid config file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid job file {}: {message}", path.display())]
    JobFile { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Manager(#[from] ManagerError),
}

/// Start the daemon with the ssh provider and SLURM status
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    let provider = TracedProvider::new(SshProvider::new(config.settings.ssh_config()));
    startup_with(config, Arc::new(provider), Arc::new(SlurmStatus)).await
}

/// Start the daemon with the given adapters.
///
/// Order: lock, manager, handlers, load, worker, resume.
pub async fn startup_with(
    config: &Config,
    provider: Arc<dyn ConnectionProvider>,
    scheduler: Arc<dyn SchedulerStatus>,
) -> Result<DaemonState, LifecycleError> {
    // 1. Create state directory
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents two daemons driving the same jobs.
    // Use OpenOptions to avoid truncating the file before we hold the lock,
    // which would wipe the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    // Write PID to lock file (truncate now that we hold the lock)
    use std::io::Write;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Build the manager
    let manager = JobManager::new(
        ManagerDeps {
            provider,
            store: JobStore::new(&config.jobs_path),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGen),
        },
        config.settings.manager_config(),
    );
    manager.register(
        BATCH_KIND,
        BatchHandler::factory(scheduler, config.settings.poll_interval()),
    );

    // 4. Recover persisted jobs, then continue them
    let loaded = manager.load_jobs();
    let worker = manager.start()?;
    if loaded > 0 {
        info!(loaded, "resuming persisted jobs");
        manager.resume_all().await;
    }

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        manager,
        worker,
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
