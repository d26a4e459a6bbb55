// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rj_core::test_support::details;
use serde_json::json;

#[test]
fn persisted_jobs_load_into_a_fresh_manager() {
    let ctx = setup();
    let job = Job::new("a", STUB_KIND, test_host()).with_details(details([
        ("workdir", json!("/scratch/a")),
        ("scheduler_ids", json!(["77"])),
    ]));
    ctx.manager.manage(job);
    let id = JobId::new("a");
    ctx.manager.set_state(
        &id,
        JobStatus::Running,
        StateUpdate::new()
            .progress(30.0)
            .message("polling")
            .traceback("deploy", "slow queue")
            .start_time(5),
    );
    ctx.manager.persist(&id);

    let reopened = ctx.reopen();
    assert_eq!(reopened.load_jobs(), 1);

    let loaded = reopened.get(&id).unwrap();
    assert_eq!(loaded, ctx.manager.get(&id).unwrap());
    assert!(!reopened.is_mounted(&id));
}

#[test]
fn load_jobs_skips_ids_already_managed() {
    let ctx = setup();
    ctx.manager.manage(Job::new("a", STUB_KIND, test_host()));
    ctx.manager.persist(&JobId::new("a"));

    assert_eq!(ctx.manager.load_jobs(), 0);
    assert_eq!(ctx.events.of(JobEvent::Managed).len(), 1);
}

#[test]
fn persist_keeps_other_jobs_in_the_document() {
    let ctx = setup();
    for id in ["a", "b"] {
        ctx.manager.manage(Job::new(id, STUB_KIND, test_host()));
        ctx.manager.persist(&JobId::new(id));
    }
    ctx.manager
        .set_state(&JobId::new("a"), JobStatus::Running, StateUpdate::new());
    ctx.manager.persist(&JobId::new("a"));

    let reopened = ctx.reopen();
    assert_eq!(reopened.load_jobs(), 2);
    assert_eq!(
        reopened.get(&JobId::new("a")).unwrap().status,
        JobStatus::Running
    );
    assert_eq!(
        reopened.get(&JobId::new("b")).unwrap().status,
        JobStatus::Pending
    );
}

#[test]
fn persist_of_unknown_job_writes_nothing() {
    let ctx = setup();

    ctx.manager.persist(&JobId::new("missing"));

    assert!(!ctx.store_path().exists());
}

#[test]
fn persist_failure_is_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the file should be makes every write fail
    let store_path = dir.path().join("jobs.json");
    std::fs::create_dir(&store_path).unwrap();
    let manager = JobManager::new(
        ManagerDeps {
            provider: Arc::new(rj_adapters::FakeConnectionProvider::new()),
            store: JobStore::new(&store_path),
            clock: Arc::new(FakeClock::new()),
            ids: Arc::new(rj_core::SequentialIdGen::default()),
        },
        ManagerConfig::default(),
    );
    manager.manage(Job::new("a", STUB_KIND, test_host()));

    manager.persist(&JobId::new("a"));

    assert!(store_path.is_dir());
    assert!(manager.contains(&JobId::new("a")));
}

#[test]
fn load_from_missing_store_yields_nothing() {
    let ctx = setup();

    assert_eq!(ctx.manager.load_jobs(), 0);
    assert!(ctx.manager.jobs().is_empty());
}
