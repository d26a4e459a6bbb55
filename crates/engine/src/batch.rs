// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler for plain batch-scheduler jobs.
//!
//! A batch job is described entirely by its details:
//!
//! - `workdir`: remote directory the commands run in
//! - `submit`: command that submits the work, e.g. `sbatch run.sh`
//! - `collect` (optional): command whose stdout is stored as the result
//!
//! After submission the scheduler ids are kept in `details.scheduler_ids`.

use crate::error::HandlerError;
use crate::handler::{HandlerContext, JobHandler};
use async_trait::async_trait;
use rj_adapters::SchedulerStatus;
use rj_core::{Action, Job, JobStatus, StateUpdate};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const BATCH_KIND: &str = "batch";

/// Default delay between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

const SCHEDULER_IDS: &str = "scheduler_ids";

pub struct BatchHandler {
    scheduler: Arc<dyn SchedulerStatus>,
    poll_interval: Duration,
}

impl BatchHandler {
    pub fn new(scheduler: Arc<dyn SchedulerStatus>, poll_interval: Duration) -> Self {
        Self {
            scheduler,
            poll_interval,
        }
    }

    /// Factory for registering the `batch` kind.
    ///
    /// Rejects jobs that lack a `workdir` or `submit` detail.
    pub fn factory(
        scheduler: Arc<dyn SchedulerStatus>,
        poll_interval: Duration,
    ) -> impl Fn(&Job) -> Result<Arc<dyn JobHandler>, HandlerError> + Send + Sync + 'static {
        move |job: &Job| {
            for key in ["workdir", "submit"] {
                if job.detail_str(key).is_none() {
                    return Err(HandlerError::Factory(format!(
                        "batch job {} has no {key} detail",
                        job.id
                    )));
                }
            }
            let handler: Arc<dyn JobHandler> =
                Arc::new(BatchHandler::new(Arc::clone(&scheduler), poll_interval));
            Ok(handler)
        }
    }
}

#[async_trait]
impl JobHandler for BatchHandler {
    async fn deploy(&self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let workdir = required(&ctx.job, "workdir")?;
        let submit = required(&ctx.job, "submit")?;

        ctx.set_state(
            JobStatus::Deploying,
            StateUpdate::new().message("submitting"),
        );
        let command = format!("cd {} && {submit}", shell_quote(workdir));
        let output = ctx.connection.run_command(&command, true).await?;
        if !output.success() {
            return Err(HandlerError::RemoteOutput(format!(
                "submit exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        let tracking_id = parse_tracking_id(&output.stdout).ok_or_else(|| {
            HandlerError::RemoteOutput(format!(
                "no job id in submit output: {}",
                output.stdout.trim()
            ))
        })?;

        tracing::info!(job_id = %ctx.id(), %tracking_id, "batch job submitted");
        ctx.set_state(
            JobStatus::Running,
            StateUpdate::new()
                .message(format!("submitted as {tracking_id}"))
                .detail(SCHEDULER_IDS, Value::from(vec![tracking_id]))
                .start_time(ctx.now_ms()),
        );
        ctx.persist();
        ctx.schedule(Action::Progress);
        Ok(())
    }

    async fn progress(&self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let ids = scheduler_ids(&ctx.job)?;
        let report = self.scheduler.query(ctx.connection.as_ref(), &ids).await?;

        if !report.all_done() {
            ctx.set_state(
                JobStatus::Running,
                StateUpdate::new()
                    .progress(report.percent_done())
                    .message("running"),
            );
            ctx.schedule_after(Action::Progress, self.poll_interval);
            return Ok(());
        }

        if report.any_failed() {
            ctx.set_state(
                JobStatus::Failed,
                StateUpdate::new()
                    .message("remote job failed")
                    .traceback("progress", format!("scheduler reported failure for {}", ids.join(", ")))
                    .end_time(ctx.now_ms()),
            );
        } else {
            ctx.set_state(
                JobStatus::Completed,
                StateUpdate::new()
                    .progress(100.0)
                    .message("completed")
                    .end_time(ctx.now_ms()),
            );
        }
        ctx.persist();
        Ok(())
    }

    async fn cancel(&self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let ids = match scheduler_ids(&ctx.job) {
            Ok(ids) => ids,
            Err(_) => {
                // Never submitted; nothing remote to stop
                ctx.set_state(
                    JobStatus::Cancelled,
                    StateUpdate::new()
                        .message("cancelled before submission")
                        .end_time(ctx.now_ms()),
                );
                ctx.persist();
                return Ok(());
            }
        };

        let command = self.scheduler.cancel_command(&ids);
        let output = ctx.connection.run_command(&command, true).await?;
        if output.success() {
            ctx.set_state(
                JobStatus::Cancelled,
                StateUpdate::new()
                    .message("cancelled")
                    .end_time(ctx.now_ms()),
            );
        } else {
            tracing::warn!(job_id = %ctx.id(), stderr = %output.stderr.trim(), "remote cancel failed");
            ctx.set_state(
                JobStatus::Ghost,
                StateUpdate::new()
                    .message("remote cancel failed")
                    .traceback("cancel", output.stderr.trim().to_string()),
            );
        }
        ctx.persist();
        Ok(())
    }

    async fn collect(&self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        let workdir = required(&ctx.job, "workdir")?;
        let collect = required(&ctx.job, "collect")?;

        let command = format!("cd {} && {collect}", shell_quote(workdir));
        let output = ctx.connection.run_command(&command, false).await?;
        if !output.success() {
            return Err(HandlerError::RemoteOutput(format!(
                "collect exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        // Status is left as it is
        ctx.set_state(
            ctx.job.status,
            StateUpdate::new().detail("collect_output", output.stdout),
        );
        ctx.persist();
        Ok(())
    }
}

fn required<'a>(job: &'a Job, key: &str) -> Result<&'a str, HandlerError> {
    job.detail_str(key)
        .ok_or_else(|| HandlerError::MissingDetail(key.to_string()))
}

/// Scheduler ids recorded at submission. Numeric entries are accepted.
fn scheduler_ids(job: &Job) -> Result<Vec<String>, HandlerError> {
    let ids: Vec<String> = job
        .details
        .get(SCHEDULER_IDS)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    if ids.is_empty() {
        return Err(HandlerError::MissingDetail(SCHEDULER_IDS.to_string()));
    }
    Ok(ids)
}

/// Pull the scheduler's job id out of a submit command's stdout.
///
/// Takes the first token whose leading part is all digits, so
/// `Submitted batch job 4242`, `4242;cluster` and `4242.pbs01` all work.
pub fn parse_tracking_id(stdout: &str) -> Option<String> {
    stdout.split_whitespace().find_map(|token| {
        let token = token.split(';').next().unwrap_or(token);
        let number = token.split('.').next().unwrap_or(token);
        if !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()) {
            Some(token.to_string())
        } else {
            None
        }
    })
}

/// Single-quote `s` for a POSIX shell
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
