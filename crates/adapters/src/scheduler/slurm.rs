// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SLURM status via `squeue`

use super::{RemoteState, SchedulerError, SchedulerReport, SchedulerStatus};
use crate::connection::Connection;
use async_trait::async_trait;

/// Queries SLURM with `squeue`.
///
/// Finished jobs drop out of `squeue`, so any tracked id missing from the
/// output is reported as [`RemoteState::Finished`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SlurmStatus;

impl SlurmStatus {
    fn query_command(ids: &[String]) -> String {
        format!("squeue -h -o '%i %T' -j {}", ids.join(","))
    }

    /// Parse `squeue -h -o '%i %T'` lines into a report over `ids`.
    pub fn parse(ids: &[String], stdout: &str) -> SchedulerReport {
        let mut report = SchedulerReport::new();
        for line in stdout.lines() {
            let mut fields = line.split_whitespace();
            let (Some(raw_id), Some(state)) = (fields.next(), fields.next()) else {
                continue;
            };
            // Array tasks (`1234_7`) fold into their parent id
            let base = raw_id.split('_').next().unwrap_or(raw_id);
            if ids.iter().any(|id| id == base) {
                report.record(base, map_state(state));
            }
        }
        for id in ids {
            if report.get(id).is_none() {
                report.record(id.clone(), RemoteState::Finished);
            }
        }
        report
    }
}

fn map_state(state: &str) -> RemoteState {
    match state {
        "PENDING" | "CONFIGURING" | "REQUEUED" | "REQUEUE_HOLD" | "RESV_DEL_HOLD" => {
            RemoteState::Queued
        }
        "RUNNING" | "COMPLETING" | "SUSPENDED" | "STOPPED" | "RESIZING" | "SIGNALING"
        | "STAGE_OUT" => RemoteState::Running,
        "COMPLETED" => RemoteState::Finished,
        "FAILED" | "CANCELLED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "PREEMPTED"
        | "BOOT_FAIL" | "DEADLINE" | "REVOKED" => RemoteState::Failed,
        _ => RemoteState::Unknown,
    }
}

#[async_trait]
impl SchedulerStatus for SlurmStatus {
    async fn query(
        &self,
        conn: &dyn Connection,
        ids: &[String],
    ) -> Result<SchedulerReport, SchedulerError> {
        if ids.is_empty() {
            return Ok(SchedulerReport::new());
        }

        let output = conn.run_command(&Self::query_command(ids), false).await?;
        if !output.success() {
            // squeue rejects the whole query once every id has aged out
            if output.stderr.contains("Invalid job id") {
                return Ok(Self::parse(ids, ""));
            }
            return Err(SchedulerError::Query(output.stderr.trim().to_string()));
        }
        Ok(Self::parse(ids, &output.stdout))
    }

    fn cancel_command(&self, ids: &[String]) -> String {
        format!("scancel {}", ids.join(" "))
    }
}

#[cfg(test)]
#[path = "slurm_tests.rs"]
mod tests;
