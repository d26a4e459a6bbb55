// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart recovery: loading, re-mounting and continuing jobs.

use super::*;
use rj_adapters::ConnectionError;

/// Persist a bare stub job with `status`, then load it into a new manager
fn reload(ctx: &TestContext, id: &str, status: JobStatus) -> (Arc<JobManager>, JobId) {
    reload_job(ctx, Job::new(id, STUB_KIND, test_host()).with_status(status))
}

fn reload_job(ctx: &TestContext, job: Job) -> (Arc<JobManager>, JobId) {
    let id = job.id.clone();
    ctx.manager.manage(job);
    ctx.manager.persist(&id);
    let reopened = ctx.reopen();
    reopened.load_jobs();
    (reopened, id)
}

#[tokio::test]
async fn credential_failure_during_resume_leaves_job_idle() {
    let ctx = setup();
    let (manager, id) = reload(&ctx, "a", JobStatus::Running);
    register_stub(&manager, &StubHandler::default());
    ctx.provider
        .fail_connect(&test_host(), ConnectionError::Auth("password expired".to_string()));

    manager.resume_all().await;

    let job = manager.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Idle);
    assert!(!job.traceback.is_empty());
    assert!(!manager.is_mounted(&id));
}

#[tokio::test]
async fn idle_job_resumes_to_running_and_polls() {
    let ctx = setup();
    let mut job = Job::new("a", STUB_KIND, test_host()).with_status(JobStatus::Idle);
    job.start_time = Some(FakeClock::START_MS);
    let (manager, id) = reload_job(&ctx, job);
    let handler = StubHandler::default();
    register_stub(&manager, &handler);
    let worker = manager.start().unwrap();

    manager.resume(&id).await.unwrap();

    assert!(manager.is_mounted(&id));
    wait_for_status(&manager, &id, JobStatus::Completed).await;
    assert_eq!(handler.actions(), [Action::Progress]);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn idle_job_that_never_deployed_is_redeployed() {
    let ctx = setup();
    let handler = StubHandler::default();
    register_stub(&ctx.manager, &handler);
    ctx.provider
        .fail_connect(&test_host(), ConnectionError::Auth("password expired".to_string()));
    let worker = ctx.manager.start().unwrap();
    let id = ctx
        .manager
        .create(STUB_KIND, test_host(), Map::new())
        .unwrap();
    let idle = wait_for_status(&ctx.manager, &id, JobStatus::Idle).await;
    assert_eq!(idle.start_time, None);

    ctx.manager.resume(&id).await.unwrap();

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Completed).await;
    assert!(job.start_time.is_some());
    assert_eq!(handler.actions(), [Action::Deploy, Action::Progress]);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn resuming_a_live_job_does_not_poll_twice() {
    let ctx = setup();
    let handler = StubHandler::with_steps([
        Step::Working(10.0),
        Step::Working(20.0),
        Step::Working(30.0),
    ]);
    register_stub(&ctx.manager, &handler);
    let id = manage_stub(&ctx.manager, "a", JobStatus::Running);
    ctx.manager.schedule(&id, Action::Progress);

    ctx.manager.resume(&id).await.unwrap();
    ctx.manager.resume(&id).await.unwrap();
    ctx.manager.shutdown();
    ctx.manager.start().unwrap().join().await;

    assert_eq!(handler.actions(), [Action::Progress]);
    assert_eq!(ctx.manager.get(&id).unwrap().progress, 10.0);
}

#[tokio::test]
async fn running_and_retrying_jobs_poll_after_resume() {
    let ctx = setup();
    let handler = StubHandler::default();
    let (manager, running) = reload(&ctx, "a", JobStatus::Running);
    ctx.manager
        .manage(Job::new("b", STUB_KIND, test_host()).with_status(JobStatus::Retrying));
    ctx.manager.persist(&JobId::new("b"));
    manager.load_jobs();
    let retrying = JobId::new("b");
    register_stub(&manager, &handler);
    let worker = manager.start().unwrap();

    manager.resume_all().await;

    wait_for_status(&manager, &running, JobStatus::Completed).await;
    wait_for_status(&manager, &retrying, JobStatus::Completed).await;
    assert_eq!(handler.actions(), [Action::Progress, Action::Progress]);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn pending_job_is_only_remounted() {
    let ctx = setup();
    let (manager, id) = reload(&ctx, "a", JobStatus::Pending);
    let handler = StubHandler::default();
    register_stub(&manager, &handler);

    manager.resume(&id).await.unwrap();
    manager.shutdown();
    manager.start().unwrap().join().await;

    assert!(manager.is_mounted(&id));
    assert!(handler.calls().is_empty());
    assert_eq!(manager.get(&id).unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn resume_all_mounts_settled_jobs_without_connecting() {
    let ctx = setup();
    for (id, status) in [
        ("done", JobStatus::Completed),
        ("gone", JobStatus::Cancelled),
        ("lost", JobStatus::Ghost),
    ] {
        ctx.manager
            .manage(Job::new(id, STUB_KIND, test_host()).with_status(status));
        ctx.manager.persist(&JobId::new(id));
    }
    let manager = ctx.reopen();
    assert_eq!(manager.load_jobs(), 3);
    register_stub(&manager, &StubHandler::default());

    manager.resume_all().await;

    assert_eq!(ctx.provider.connect_count(), 0);
    assert_eq!(
        statuses(&manager.jobs()),
        [JobStatus::Completed, JobStatus::Cancelled, JobStatus::Ghost]
    );
    for id in ["done", "gone", "lost"] {
        assert!(manager.is_mounted(&JobId::new(id)), "{id} not mounted");
    }
}

#[tokio::test]
async fn reloaded_completed_job_can_be_collected() {
    let ctx = setup();
    let (manager, id) = reload(&ctx, "a", JobStatus::Completed);
    register_stub(&manager, &StubHandler::default());

    manager.resume_all().await;
    let err = manager.collect(&id).await.unwrap_err();

    // Reaches the handler, which has no collect step
    assert!(matches!(
        err,
        ManagerError::Handler {
            source: HandlerError::Unsupported(Action::Collect),
            ..
        }
    ));
}

#[tokio::test]
async fn reloaded_ghost_job_can_be_cancelled() {
    let ctx = setup();
    let handler = StubHandler::default();
    let (manager, id) = reload(&ctx, "a", JobStatus::Ghost);
    register_stub(&manager, &handler);
    let worker = manager.start().unwrap();

    manager.resume_all().await;
    manager.cancel(&id);

    wait_for_status(&manager, &id, JobStatus::Cancelled).await;
    assert_eq!(handler.actions(), [Action::Cancel]);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn transport_failure_in_resume_all_forces_idle() {
    let ctx = setup();
    let (manager, id) = reload(&ctx, "a", JobStatus::Running);
    register_stub(&manager, &StubHandler::default());
    ctx.provider.fail_connect(
        &test_host(),
        ConnectionError::Transport("connection refused".to_string()),
    );

    manager.resume_all().await;

    let job = manager.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Idle);
    assert!(job.traceback["resume"].contains("connection refused"));
}

#[tokio::test]
async fn direct_resume_reports_transport_failure() {
    let ctx = setup();
    let (manager, id) = reload(&ctx, "a", JobStatus::Running);
    register_stub(&manager, &StubHandler::default());
    ctx.provider.fail_connect(
        &test_host(),
        ConnectionError::Transport("connection refused".to_string()),
    );

    let err = manager.resume(&id).await.unwrap_err();

    assert!(matches!(err, ManagerError::Connection(_)));
    assert_eq!(manager.get(&id).unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn mount_failure_in_resume_all_forces_idle() {
    let ctx = setup();
    let (manager, id) = reload(&ctx, "a", JobStatus::Running);
    manager.register(STUB_KIND, |job: &Job| {
        Err(HandlerError::Factory(format!("{} is corrupt", job.id)))
    });

    manager.resume_all().await;

    let job = manager.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Idle);
    assert!(job.traceback["resume"].contains("a is corrupt"));
    let persisted = manager.store().load();
    assert_eq!(persisted[0].1.status, JobStatus::Idle);
}

#[tokio::test]
async fn resume_of_unknown_job_is_a_noop() {
    let ctx = setup();

    ctx.manager.resume(&JobId::new("missing")).await.unwrap();

    assert_eq!(ctx.provider.connect_count(), 0);
}
