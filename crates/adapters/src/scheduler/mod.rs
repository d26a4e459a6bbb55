// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote batch-scheduler status queries

mod slurm;

pub use slurm::SlurmStatus;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSchedulerStatus;

use crate::connection::{Connection, ConnectionError};
use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("status query failed: {0}")]
    Query(String),
}

/// Scheduler-agnostic state of one tracked remote job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RemoteState {
    Finished,
    Failed,
    Unknown,
    Queued,
    Running,
}

impl RemoteState {
    pub fn is_done(self) -> bool {
        matches!(self, RemoteState::Finished | RemoteState::Failed)
    }
}

/// States for the tracking ids of one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    states: IndexMap<String, RemoteState>,
}

impl SchedulerReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `state` for `id`; the more active of two states for one id wins.
    pub fn record(&mut self, id: impl Into<String>, state: RemoteState) {
        let entry = self.states.entry(id.into()).or_insert(state);
        *entry = (*entry).max(state);
    }

    pub fn get(&self, id: &str) -> Option<RemoteState> {
        self.states.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Every tracked id has reached a final state.
    pub fn all_done(&self) -> bool {
        self.states.values().all(|s| s.is_done())
    }

    pub fn any_failed(&self) -> bool {
        self.states.values().any(|s| *s == RemoteState::Failed)
    }

    /// Share of tracked ids in a final state, as a percentage.
    pub fn percent_done(&self) -> f64 {
        if self.states.is_empty() {
            return 100.0;
        }
        let done = self.states.values().filter(|s| s.is_done()).count();
        done as f64 * 100.0 / self.states.len() as f64
    }
}

/// Translates a cluster's job-status output into a [`SchedulerReport`]
#[async_trait]
pub trait SchedulerStatus: Send + Sync + 'static {
    async fn query(
        &self,
        conn: &dyn Connection,
        ids: &[String],
    ) -> Result<SchedulerReport, SchedulerError>;

    /// Command line that cancels `ids` on this scheduler.
    fn cancel_command(&self, ids: &[String]) -> String;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
