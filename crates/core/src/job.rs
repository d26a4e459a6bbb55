// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job entity, status machine and the merge rules for state updates.

use crate::host::Host;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for an orchestrated job.
    ///
    /// Assigned at creation and never changed; it keys the registry, the
    /// persisted document, and every queued event for the job.
    pub struct JobId;
}

/// Lifecycle status of a job.
///
/// `Completed`, `Failed`, `Cancelled` and `Idle` are terminal for the worker
/// loop: events for such jobs are dropped until the job is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Deploying,
    Running,
    Retrying,
    Completed,
    Failed,
    Cancelled,
    /// Remote cancellation could not be confirmed; cleared only by an operator.
    Ghost,
    /// Not attached to a live connection (after restart or auth failure).
    Idle,
}

impl JobStatus {
    pub const ALL: [JobStatus; 9] = [
        JobStatus::Pending,
        JobStatus::Deploying,
        JobStatus::Running,
        JobStatus::Retrying,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
        JobStatus::Ghost,
        JobStatus::Idle,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Idle
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Deploying => "DEPLOYING",
            JobStatus::Running => "RUNNING",
            JobStatus::Retrying => "RETRYING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Ghost => "GHOST",
            JobStatus::Idle => "IDLE",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Field changes carried by a state mutation.
///
/// Every field is optional; how each one lands on the job is decided by
/// [`Job::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub traceback: IndexMap<String, String>,
    pub details: Map<String, Value>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn traceback(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.traceback.insert(key.into(), text.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn details(mut self, details: Map<String, Value>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn start_time(mut self, epoch_ms: u64) -> Self {
        self.start_time = Some(epoch_ms);
        self
    }

    pub fn end_time(mut self, epoch_ms: u64) -> Self {
        self.end_time = Some(epoch_ms);
        self
    }
}

/// A unit of remote work.
///
/// Holds only serializable state; the handler bound to a job lives beside it
/// in the engine's registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: String,
    pub host: Host,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub traceback: IndexMap<String, String>,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub start_time: Option<u64>,
    #[serde(default)]
    pub end_time: Option<u64>,
}

impl Job {
    /// A fresh `PENDING` job.
    pub fn new(id: impl Into<JobId>, kind: impl Into<String>, host: Host) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            host,
            status: JobStatus::Pending,
            progress: 0.0,
            message: None,
            traceback: IndexMap::new(),
            details: Map::new(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status change plus field updates.
    ///
    /// - `progress` is last-write-wins, clamped to `0..=100`
    /// - `message` is last-write-wins; empty or absent writes keep the old one
    /// - `traceback` and `details` merge key by key
    /// - `start_time` and `end_time` are write-once
    pub fn apply(&mut self, status: JobStatus, update: StateUpdate) {
        self.status = status;
        if let Some(progress) = update.progress {
            if progress.is_finite() {
                self.progress = progress.clamp(0.0, 100.0);
            }
        }
        if let Some(message) = update.message.filter(|m| !m.is_empty()) {
            self.message = Some(message);
        }
        self.traceback.extend(update.traceback);
        self.details.extend(update.details);
        if self.start_time.is_none() {
            self.start_time = update.start_time;
        }
        if self.end_time.is_none() {
            self.end_time = update.end_time;
        }
    }

    /// Look up a string-valued detail.
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
