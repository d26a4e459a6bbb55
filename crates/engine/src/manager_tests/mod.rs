// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job manager tests

mod dispatch;
mod lifecycle;
mod persistence;
mod resume;
mod retry;

use super::*;
use crate::test_helpers::*;
use rj_core::test_support::test_host;
use rj_core::FakeClock;
use std::time::Duration;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Manage a stub-kind job with a handler attached
fn manage_stub(manager: &JobManager, id: &str, status: JobStatus) -> JobId {
    let job = Job::new(id, STUB_KIND, test_host()).with_status(status);
    let managed = manager.mount(job).unwrap();
    assert!(managed.is_mounted(), "stub kind must be registered first");
    manager.manage(managed);
    JobId::new(id)
}

fn statuses(jobs: &[Job]) -> Vec<JobStatus> {
    jobs.iter().map(|j| j.status).collect()
}
