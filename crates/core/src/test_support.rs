// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{Host, Job, JobStatus};
use serde_json::{Map, Value};

pub fn test_host() -> Host {
    Host::new("tester", "hpc.test").with_opening_command("module load slurm")
}

pub fn pending_job(id: &str) -> Job {
    Job::new(id, "batch", test_host())
}

pub fn job_with_status(id: &str, kind: &str, status: JobStatus) -> Job {
    Job::new(id, kind, test_host()).with_status(status)
}

/// Build a details map from `(key, value)` pairs.
pub fn details<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
