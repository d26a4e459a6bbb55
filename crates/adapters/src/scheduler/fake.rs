// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake scheduler status for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{RemoteState, SchedulerError, SchedulerReport, SchedulerStatus};
use crate::connection::Connection;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Default)]
struct FakeState {
    /// One entry consumed per query; the last repeats
    results: VecDeque<Result<RemoteState, SchedulerError>>,
    queries: Vec<Vec<String>>,
}

/// Reports the same scripted state for every tracked id.
#[derive(Clone, Default)]
pub struct FakeSchedulerStatus {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeSchedulerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a state to report on the next query.
    pub fn push_state(&self, state: RemoteState) {
        self.inner.lock().results.push_back(Ok(state));
    }

    pub fn push_error(&self, error: SchedulerError) {
        self.inner.lock().results.push_back(Err(error));
    }

    /// Ids passed to each query so far
    pub fn queries(&self) -> Vec<Vec<String>> {
        self.inner.lock().queries.clone()
    }
}

#[async_trait]
impl SchedulerStatus for FakeSchedulerStatus {
    async fn query(
        &self,
        _conn: &dyn Connection,
        ids: &[String],
    ) -> Result<SchedulerReport, SchedulerError> {
        let mut inner = self.inner.lock();
        inner.queries.push(ids.to_vec());
        let next = if inner.results.len() > 1 {
            inner.results.pop_front()
        } else {
            inner.results.front().cloned()
        };
        let state = next.unwrap_or(Ok(RemoteState::Finished))?;

        let mut report = SchedulerReport::new();
        for id in ids {
            report.record(id.clone(), state);
        }
        Ok(report)
    }

    fn cancel_command(&self, ids: &[String]) -> String {
        format!("fake-cancel {}", ids.join(" "))
    }
}
