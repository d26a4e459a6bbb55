// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rj_core::test_support::details;
use serde_json::json;

#[test]
fn manage_is_idempotent_per_id() {
    let ctx = setup();
    let job = Job::new("a", STUB_KIND, test_host());

    assert!(ctx.manager.manage(job.clone()));
    assert!(!ctx.manager.manage(job.with_status(JobStatus::Running)));

    assert_eq!(ctx.events.of(JobEvent::Managed).len(), 1);
    assert_eq!(ctx.manager.get(&JobId::new("a")).unwrap().status, JobStatus::Pending);
}

#[test]
fn set_state_on_unknown_id_changes_nothing() {
    let ctx = setup();
    ctx.manager.manage(Job::new("a", STUB_KIND, test_host()));
    ctx.events.clear();

    ctx.manager.set_state(
        &JobId::new("missing"),
        JobStatus::Failed,
        StateUpdate::new().message("nope"),
    );

    assert!(ctx.events.all().is_empty());
    assert_eq!(ctx.manager.jobs().len(), 1);
    assert_eq!(ctx.manager.jobs()[0].status, JobStatus::Pending);
}

#[test]
fn set_state_notifies_with_updated_snapshot() {
    let ctx = setup();
    ctx.manager.manage(Job::new("a", STUB_KIND, test_host()));
    let id = JobId::new("a");

    ctx.manager.set_state(
        &id,
        JobStatus::Running,
        StateUpdate::new()
            .progress(40.0)
            .message("halfway")
            .traceback("deploy", "warning")
            .start_time(10),
    );
    ctx.manager.set_state(
        &id,
        JobStatus::Running,
        StateUpdate::new().message("").traceback("progress", "slow").start_time(99),
    );

    let modified = ctx.events.of(JobEvent::Modified);
    assert_eq!(modified.len(), 2);
    let last = &modified[1];
    assert_eq!(last.progress, 40.0);
    assert_eq!(last.message.as_deref(), Some("halfway"));
    assert_eq!(last.traceback.len(), 2);
    assert_eq!(last.start_time, Some(10));
    assert_eq!(&ctx.manager.get(&id).unwrap(), last);
}

#[test]
fn jobs_are_listed_in_insertion_order() {
    let ctx = setup();
    for id in ["c", "a", "b"] {
        ctx.manager.manage(Job::new(id, STUB_KIND, test_host()));
    }

    let ids: Vec<String> = ctx.manager.jobs().into_iter().map(|j| j.id.to_string()).collect();
    assert_eq!(ids, ["c", "a", "b"]);
}

#[test]
fn create_rejects_unregistered_kind() {
    let ctx = setup();

    let err = ctx
        .manager
        .create("mystery", test_host(), Default::default())
        .unwrap_err();

    assert!(matches!(err, ManagerError::UnknownKind(kind) if kind == "mystery"));
    assert!(ctx.manager.jobs().is_empty());
}

#[test]
fn create_manages_and_persists_a_pending_job() {
    let ctx = setup();
    register_stub(&ctx.manager, &StubHandler::default());

    let id = ctx
        .manager
        .create(STUB_KIND, test_host(), details([("workdir", json!("/scratch"))]))
        .unwrap();

    assert_eq!(id, "job-1");
    let job = ctx.manager.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.detail_str("workdir"), Some("/scratch"));
    assert!(ctx.manager.is_mounted(&id));
    assert_eq!(ctx.events.of(JobEvent::Managed).len(), 1);

    let stored = ctx.manager.store().load();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0, id);
}

#[test]
fn create_surfaces_factory_failure() {
    let ctx = setup();
    ctx.manager.register(STUB_KIND, |_job: &Job| {
        Err(HandlerError::Factory("bad inputs".to_string()))
    });

    let err = ctx
        .manager
        .create(STUB_KIND, test_host(), Default::default())
        .unwrap_err();

    assert!(matches!(err, ManagerError::Mount { .. }));
    assert!(ctx.manager.jobs().is_empty());
}

#[tokio::test]
async fn created_job_runs_to_completion() {
    let ctx = setup();
    register_stub(&ctx.manager, &StubHandler::default());
    let worker = ctx.manager.start().unwrap();

    let id = ctx
        .manager
        .create(STUB_KIND, test_host(), Default::default())
        .unwrap();

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Completed).await;
    assert_eq!(job.progress, 100.0);
    assert_eq!(job.start_time, Some(FakeClock::START_MS));
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[test]
fn remove_drops_job_from_registry_and_disk() {
    let ctx = setup();
    let job = Job::new("a", STUB_KIND, test_host());
    ctx.manager.manage(job);
    let id = JobId::new("a");
    ctx.manager.persist(&id);

    assert!(ctx.manager.remove(&id));

    assert!(!ctx.manager.contains(&id));
    assert!(ctx.manager.store().load().is_empty());
    let deleted = ctx.events.of(JobEvent::Deleted);
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, id);
}

#[test]
fn remove_unknown_job_is_a_noop() {
    let ctx = setup();

    assert!(!ctx.manager.remove(&JobId::new("missing")));
    assert!(ctx.events.all().is_empty());
}

#[tokio::test]
async fn cancel_routes_through_the_handler() {
    let ctx = setup();
    let handler = StubHandler::default();
    register_stub(&ctx.manager, &handler);
    let id = manage_stub(&ctx.manager, "a", JobStatus::Running);
    let worker = ctx.manager.start().unwrap();

    ctx.manager.cancel(&id);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Cancelled).await;
    assert!(job.end_time.is_some());
    assert_eq!(handler.actions(), [Action::Cancel]);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}
