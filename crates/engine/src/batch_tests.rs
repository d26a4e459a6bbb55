// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{setup, wait_for_status, TestContext};
use crate::ManagerError;
use rj_adapters::{
    CommandOutput, ConnectionError, FakeSchedulerStatus, RemoteState, SchedulerError,
};
use rj_core::test_support::{details, test_host};
use rj_core::JobId;
use serde_json::json;

const POLL: Duration = Duration::from_millis(5);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[yare::parameterized(
    slurm         = { "Submitted batch job 4242\n", Some("4242") },
    parsable      = { "4242;cluster\n", Some("4242") },
    pbs           = { "4242.pbs01\n", Some("4242.pbs01") },
    after_banner  = { "module loaded\nSubmitted batch job 17", Some("17") },
    no_digits     = { "sbatch: error: invalid partition", None },
    empty         = { "", None },
    dotted_word   = { "v1.2 queued", None },
)]
fn tracking_id_from_submit_output(stdout: &str, expected: Option<&str>) {
    assert_eq!(parse_tracking_id(stdout).as_deref(), expected);
}

#[yare::parameterized(
    plain  = { "/scratch/run", "'/scratch/run'" },
    spaces = { "/scratch/my run", "'/scratch/my run'" },
    quote  = { "it's", r"'it'\''s'" },
)]
fn quoting(input: &str, expected: &str) {
    assert_eq!(shell_quote(input), expected);
}

fn batch_details() -> serde_json::Map<String, Value> {
    details([
        ("workdir", json!("/scratch/run")),
        ("submit", json!("sbatch run.sh")),
        ("collect", json!("cat result.txt")),
    ])
}

fn register_batch(ctx: &TestContext) -> FakeSchedulerStatus {
    let scheduler = FakeSchedulerStatus::new();
    ctx.manager
        .register(BATCH_KIND, BatchHandler::factory(Arc::new(scheduler.clone()), POLL));
    scheduler
}

/// Manage a mounted batch job that was already submitted as `4242`
fn manage_submitted(ctx: &TestContext, status: JobStatus) -> JobId {
    let mut fields = batch_details();
    fields.insert("scheduler_ids".to_string(), json!(["4242"]));
    let job = Job::new("b1", BATCH_KIND, test_host())
        .with_details(fields)
        .with_status(status);
    let managed = ctx.manager.mount(job).unwrap();
    ctx.manager.manage(managed);
    JobId::new("b1")
}

#[test]
fn factory_requires_workdir_and_submit() {
    let ctx = setup();
    register_batch(&ctx);

    let err = ctx
        .manager
        .create(BATCH_KIND, test_host(), details([("submit", json!("sbatch x"))]))
        .unwrap_err();

    assert!(err.to_string().contains("no workdir detail"), "{err}");
}

#[tokio::test]
async fn submit_poll_and_complete() {
    let ctx = setup();
    let scheduler = register_batch(&ctx);
    scheduler.push_state(RemoteState::Running);
    scheduler.push_state(RemoteState::Finished);
    ctx.provider
        .respond("sbatch", CommandOutput::new("Submitted batch job 4242\n", ""));
    let worker = ctx.manager.start().unwrap();

    let id = ctx
        .manager
        .create(BATCH_KIND, test_host(), batch_details())
        .unwrap();

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Completed).await;
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);

    assert_eq!(job.details["scheduler_ids"], json!(["4242"]));
    assert_eq!(job.progress, 100.0);
    assert!(job.start_time.is_some());
    assert!(job.end_time.is_some());
    assert_eq!(
        ctx.provider.commands(),
        ["cd '/scratch/run' && sbatch run.sh"]
    );
    assert_eq!(scheduler.queries(), [vec!["4242"], vec!["4242"]]);

    let stored = ctx.manager.store().load();
    assert_eq!(stored[0].1.status, JobStatus::Completed);
}

#[tokio::test]
async fn submit_without_job_id_fails() {
    let ctx = setup();
    register_batch(&ctx);
    ctx.provider
        .respond("sbatch", CommandOutput::new("sbatch: queued somewhere\n", ""));
    let worker = ctx.manager.start().unwrap();

    let id = ctx
        .manager
        .create(BATCH_KIND, test_host(), batch_details())
        .unwrap();

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Failed).await;
    assert!(job.traceback["deploy"].contains("no job id"));
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn rejected_submit_fails() {
    let ctx = setup();
    register_batch(&ctx);
    ctx.provider.respond(
        "sbatch",
        CommandOutput::new("", "sbatch: error: invalid partition\n").with_exit_code(1),
    );
    let worker = ctx.manager.start().unwrap();

    let id = ctx
        .manager
        .create(BATCH_KIND, test_host(), batch_details())
        .unwrap();

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Failed).await;
    assert!(job.traceback["deploy"].contains("invalid partition"));
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn remote_failure_fails_the_job() {
    let ctx = setup();
    let scheduler = register_batch(&ctx);
    scheduler.push_state(RemoteState::Failed);
    let id = manage_submitted(&ctx, JobStatus::Running);
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&id, Action::Progress);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Failed).await;
    assert!(job.traceback["progress"].contains("4242"));
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn poll_transport_failure_retries() {
    let ctx = setup();
    let scheduler = register_batch(&ctx);
    scheduler.push_error(SchedulerError::Connection(ConnectionError::Transport(
        "broken pipe".to_string(),
    )));
    scheduler.push_state(RemoteState::Finished);
    let id = manage_submitted(&ctx, JobStatus::Running);
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&id, Action::Progress);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Completed).await;
    assert!(job.traceback["retry"].contains("broken pipe"));
    assert_eq!(ctx.provider.connect_count(), 2);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn poll_query_error_fails_the_job() {
    let ctx = setup();
    let scheduler = register_batch(&ctx);
    scheduler.push_error(SchedulerError::Query("squeue: command not found".to_string()));
    let id = manage_submitted(&ctx, JobStatus::Running);
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&id, Action::Progress);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Failed).await;
    assert!(job.traceback["progress"].contains("command not found"));
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn cancel_runs_scheduler_cancel_command() {
    let ctx = setup();
    register_batch(&ctx);
    let id = manage_submitted(&ctx, JobStatus::Running);
    let worker = ctx.manager.start().unwrap();

    ctx.manager.cancel(&id);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Cancelled).await;
    assert!(job.end_time.is_some());
    assert_eq!(ctx.provider.commands(), ["fake-cancel 4242"]);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn failed_remote_cancel_leaves_a_ghost() {
    let ctx = setup();
    register_batch(&ctx);
    ctx.provider.respond(
        "fake-cancel",
        CommandOutput::new("", "Access/permission denied\n").with_exit_code(1),
    );
    let id = manage_submitted(&ctx, JobStatus::Running);
    let worker = ctx.manager.start().unwrap();

    ctx.manager.cancel(&id);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Ghost).await;
    assert_eq!(job.traceback["cancel"], "Access/permission denied");
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn cancel_before_submission_needs_no_remote_call() {
    let ctx = setup();
    register_batch(&ctx);
    let job = Job::new("b2", BATCH_KIND, test_host()).with_details(batch_details());
    ctx.manager.manage(ctx.manager.mount(job).unwrap());
    let id = JobId::new("b2");
    let worker = ctx.manager.start().unwrap();

    ctx.manager.cancel(&id);

    wait_for_status(&ctx.manager, &id, JobStatus::Cancelled).await;
    assert!(ctx.provider.commands().is_empty());
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn collect_stores_output_without_changing_status() {
    let ctx = setup();
    register_batch(&ctx);
    ctx.provider
        .respond("cat result.txt", CommandOutput::new("energy = -1.5\n", ""));
    let id = manage_submitted(&ctx, JobStatus::Completed);

    ctx.manager.collect(&id).await.unwrap();

    let job = ctx.manager.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.details["collect_output"], json!("energy = -1.5\n"));
    assert_eq!(
        ctx.provider.commands(),
        ["cd '/scratch/run' && cat result.txt"]
    );
}

#[tokio::test]
async fn collect_reaches_a_completed_job_reloaded_from_disk() {
    let ctx = setup();
    let mut fields = batch_details();
    fields.insert("scheduler_ids".to_string(), json!(["4242"]));
    ctx.manager.manage(
        Job::new("b1", BATCH_KIND, test_host())
            .with_details(fields)
            .with_status(JobStatus::Completed),
    );
    ctx.manager.persist(&JobId::new("b1"));
    let manager = ctx.reopen();
    manager.register(
        BATCH_KIND,
        BatchHandler::factory(Arc::new(FakeSchedulerStatus::new()), POLL),
    );
    manager.load_jobs();
    manager.resume_all().await;
    ctx.provider
        .respond("cat result.txt", CommandOutput::new("energy = -1.5\n", ""));

    manager.collect(&JobId::new("b1")).await.unwrap();

    let job = manager.get(&JobId::new("b1")).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.details["collect_output"], json!("energy = -1.5\n"));
}

#[tokio::test]
async fn collect_failure_only_records_traceback() {
    let ctx = setup();
    register_batch(&ctx);
    ctx.provider.respond(
        "cat result.txt",
        CommandOutput::new("", "No such file\n").with_exit_code(1),
    );
    let id = manage_submitted(&ctx, JobStatus::Completed);

    let err = ctx.manager.collect(&id).await.unwrap_err();

    assert!(matches!(err, ManagerError::Handler { action: Action::Collect, .. }));
    let job = ctx.manager.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.traceback["collect"].contains("No such file"));
}
