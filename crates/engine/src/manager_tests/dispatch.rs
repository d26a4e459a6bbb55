// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker loop dispatch: ordering, dropping, and failure handling.

use super::*;

#[tokio::test]
async fn deploy_and_two_polls_emit_three_modifications_in_order() {
    let ctx = setup();
    let handler = StubHandler::with_steps([Step::Working(50.0), Step::Done]);
    register_stub(&ctx.manager, &handler);
    let id = manage_stub(&ctx.manager, "a", JobStatus::Pending);
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&id, Action::Deploy);
    wait_for_status(&ctx.manager, &id, JobStatus::Completed).await;
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);

    let modified = ctx.events.of(JobEvent::Modified);
    assert_eq!(
        statuses(&modified),
        [JobStatus::Running, JobStatus::Running, JobStatus::Completed]
    );
    assert_eq!(modified[1].progress, 50.0);
    assert_eq!(modified[2].progress, 100.0);
    assert_eq!(
        handler.actions(),
        [Action::Deploy, Action::Progress, Action::Progress]
    );
}

#[tokio::test]
async fn shutdown_stops_before_later_events() {
    let ctx = setup();
    let handler = StubHandler::default();
    register_stub(&ctx.manager, &handler);
    let id = manage_stub(&ctx.manager, "a", JobStatus::Pending);

    ctx.manager.shutdown();
    ctx.manager.schedule(&id, Action::Deploy);
    let worker = ctx.manager.start().unwrap();
    worker.join().await;

    assert!(handler.calls().is_empty());
    assert_eq!(ctx.manager.get(&id).unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn events_are_processed_in_fifo_order() {
    let ctx = setup();
    let handler = StubHandler::default();
    register_stub(&ctx.manager, &handler);
    let ids: Vec<JobId> = ["a", "b", "c"]
        .into_iter()
        .map(|id| manage_stub(&ctx.manager, id, JobStatus::Pending))
        .collect();

    for id in &ids {
        ctx.manager.schedule(id, Action::Deploy);
    }
    let worker = ctx.manager.start().unwrap();
    for id in &ids {
        wait_for_status(&ctx.manager, id, JobStatus::Completed).await;
    }
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);

    let order: Vec<(String, Action)> = handler
        .calls()
        .into_iter()
        .map(|(id, action)| (id.to_string(), action))
        .collect();
    assert_eq!(
        order,
        [
            ("a".to_string(), Action::Deploy),
            ("b".to_string(), Action::Deploy),
            ("c".to_string(), Action::Deploy),
            ("a".to_string(), Action::Progress),
            ("b".to_string(), Action::Progress),
            ("c".to_string(), Action::Progress),
        ]
    );
}

#[tokio::test]
async fn events_for_terminal_jobs_are_dropped() {
    let ctx = setup();
    let handler = StubHandler::default();
    register_stub(&ctx.manager, &handler);
    let terminal = [
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
        JobStatus::Idle,
    ];
    let ids: Vec<JobId> = terminal
        .iter()
        .enumerate()
        .map(|(i, status)| manage_stub(&ctx.manager, &format!("t{i}"), *status))
        .collect();
    ctx.events.clear();

    for id in &ids {
        ctx.manager.schedule(id, Action::Progress);
        ctx.manager.schedule(id, Action::Cancel);
    }
    ctx.manager.shutdown();
    ctx.manager.start().unwrap().join().await;

    assert!(handler.calls().is_empty());
    assert!(ctx.events.all().is_empty());
    assert_eq!(statuses(&ctx.manager.jobs()), terminal);
}

#[tokio::test]
async fn events_for_unknown_jobs_are_dropped() {
    let ctx = setup();
    let handler = StubHandler::default();
    register_stub(&ctx.manager, &handler);

    ctx.manager.schedule(&JobId::new("missing"), Action::Deploy);
    ctx.manager.shutdown();
    ctx.manager.start().unwrap().join().await;

    assert!(handler.calls().is_empty());
    assert_eq!(ctx.provider.connect_count(), 0);
}

#[tokio::test]
async fn unmounted_job_is_not_dispatched() {
    let ctx = setup();
    ctx.manager
        .manage(Job::new("a", STUB_KIND, test_host()).with_status(JobStatus::Running));
    let id = JobId::new("a");

    ctx.manager.schedule(&id, Action::Progress);
    ctx.manager.shutdown();
    ctx.manager.start().unwrap().join().await;

    assert_eq!(ctx.manager.get(&id).unwrap().status, JobStatus::Running);
    assert_eq!(ctx.provider.connect_count(), 0);
}

#[tokio::test]
async fn handler_error_fails_the_job_with_traceback() {
    let ctx = setup();
    let handler = StubHandler::with_steps([Step::Broken]);
    register_stub(&ctx.manager, &handler);
    let id = manage_stub(&ctx.manager, "a", JobStatus::Running);
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&id, Action::Progress);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Failed).await;
    assert!(job.traceback["progress"].contains("exploded"));
    assert_eq!(job.end_time, Some(FakeClock::START_MS));
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn panicking_handler_does_not_stop_the_loop() {
    let ctx = setup();
    let handler = StubHandler::with_steps([Step::Panic, Step::Done]);
    register_stub(&ctx.manager, &handler);
    let a = manage_stub(&ctx.manager, "a", JobStatus::Running);
    let b = manage_stub(&ctx.manager, "b", JobStatus::Running);
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&a, Action::Progress);
    ctx.manager.schedule(&b, Action::Progress);

    wait_for_status(&ctx.manager, &b, JobStatus::Completed).await;
    assert_eq!(ctx.manager.get(&a).unwrap().status, JobStatus::Running);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn unsupported_collect_leaves_job_untouched() {
    let ctx = setup();
    register_stub(&ctx.manager, &StubHandler::default());
    let id = manage_stub(&ctx.manager, "a", JobStatus::Completed);
    ctx.events.clear();

    let err = ctx.manager.collect(&id).await.unwrap_err();

    assert!(matches!(
        err,
        ManagerError::Handler {
            source: HandlerError::Unsupported(Action::Collect),
            ..
        }
    ));
    assert!(ctx.events.all().is_empty());
    assert_eq!(ctx.manager.get(&id).unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn connections_are_cached_per_host() {
    let ctx = setup();
    register_stub(&ctx.manager, &StubHandler::default());
    let a = manage_stub(&ctx.manager, "a", JobStatus::Pending);
    let b = manage_stub(&ctx.manager, "b", JobStatus::Pending);
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&a, Action::Deploy);
    ctx.manager.schedule(&b, Action::Deploy);
    wait_for_status(&ctx.manager, &a, JobStatus::Completed).await;
    wait_for_status(&ctx.manager, &b, JobStatus::Completed).await;
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);

    assert_eq!(ctx.provider.connect_count(), 1);
}

#[tokio::test]
async fn hosts_differing_in_opening_command_get_separate_connections() {
    let ctx = setup();
    register_stub(&ctx.manager, &StubHandler::default());
    let slurm = manage_stub(&ctx.manager, "slurm", JobStatus::Pending);
    let pbs = Job::new(
        "pbs",
        STUB_KIND,
        test_host().with_opening_command("module load pbs"),
    );
    ctx.manager.manage(ctx.manager.mount(pbs).unwrap());
    let pbs = JobId::new("pbs");
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&slurm, Action::Deploy);
    ctx.manager.schedule(&pbs, Action::Deploy);
    wait_for_status(&ctx.manager, &slurm, JobStatus::Completed).await;
    wait_for_status(&ctx.manager, &pbs, JobStatus::Completed).await;
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);

    assert_eq!(ctx.provider.connect_count(), 2);
}

#[tokio::test]
async fn worker_can_only_start_once() {
    let ctx = setup();
    let worker = ctx.manager.start().unwrap();

    assert!(matches!(
        ctx.manager.start(),
        Err(ManagerError::AlreadyStarted)
    ));
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}
