// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection failures at dispatch time.

use super::*;
use rj_adapters::ConnectionError;

fn transport(msg: &str) -> ConnectionError {
    ConnectionError::Transport(msg.to_string())
}

#[tokio::test]
async fn transient_failure_retries_then_succeeds() {
    let ctx = setup();
    let handler = StubHandler::default();
    register_stub(&ctx.manager, &handler);
    let id = manage_stub(&ctx.manager, "a", JobStatus::Pending);
    ctx.provider.fail_connect(&test_host(), transport("reset by peer"));
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&id, Action::Deploy);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Completed).await;
    assert!(job.traceback["retry"].contains("reset by peer"));
    assert_eq!(ctx.manager.retry_count(&id), 0);
    assert_eq!(
        statuses(&ctx.events.of(JobEvent::Modified))[0],
        JobStatus::Retrying
    );
    assert_eq!(handler.actions()[0], Action::Deploy);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn retries_are_bounded() {
    let ctx = setup();
    let handler = StubHandler::default();
    register_stub(&ctx.manager, &handler);
    let id = manage_stub(&ctx.manager, "a", JobStatus::Running);
    for _ in 0..3 {
        ctx.provider.fail_connect(&test_host(), transport("no route to host"));
    }
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&id, Action::Progress);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Failed).await;
    assert_eq!(job.message.as_deref(), Some("gave up after 2 retries"));
    assert!(job.end_time.is_some());
    assert!(handler.calls().is_empty());
    assert_eq!(ctx.provider.connect_count(), 3);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn unbounded_policy_keeps_retrying() {
    let ctx = setup_with(ManagerConfig {
        retry: RetryPolicy {
            max_attempts: None,
            delay: Duration::from_millis(1),
        },
    });
    register_stub(&ctx.manager, &StubHandler::default());
    let id = manage_stub(&ctx.manager, "a", JobStatus::Running);
    for _ in 0..10 {
        ctx.provider.fail_connect(&test_host(), transport("flaky"));
    }
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&id, Action::Progress);

    wait_for_status(&ctx.manager, &id, JobStatus::Completed).await;
    assert_eq!(ctx.provider.connect_count(), 11);
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[tokio::test]
async fn credential_failure_moves_job_to_idle() {
    let ctx = setup();
    let handler = StubHandler::default();
    register_stub(&ctx.manager, &handler);
    let id = manage_stub(&ctx.manager, "a", JobStatus::Running);
    ctx.provider
        .fail_connect(&test_host(), ConnectionError::Auth("publickey".to_string()));
    let worker = ctx.manager.start().unwrap();

    ctx.manager.schedule(&id, Action::Progress);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Idle).await;
    assert!(job.traceback["connection"].contains("publickey"));
    assert!(handler.calls().is_empty());
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
    assert_eq!(ctx.manager.get(&id).unwrap().status, JobStatus::Idle);
}

#[tokio::test]
async fn cancel_without_connection_leaves_a_ghost() {
    let ctx = setup();
    register_stub(&ctx.manager, &StubHandler::default());
    let id = manage_stub(&ctx.manager, "a", JobStatus::Running);
    ctx.provider.fail_connect(
        &test_host(),
        ConnectionError::Timeout {
            description: "ssh connect".to_string(),
            secs: 15,
        },
    );
    let worker = ctx.manager.start().unwrap();

    ctx.manager.cancel(&id);

    let job = wait_for_status(&ctx.manager, &id, JobStatus::Ghost).await;
    assert!(job.traceback["cancel"].contains("timed out"));
    assert!(worker.shutdown(SHUTDOWN_TIMEOUT).await);
}

#[test]
fn retry_counts_attempts_per_job() {
    let ctx = setup_with(ManagerConfig {
        retry: RetryPolicy {
            max_attempts: Some(1),
            delay: Duration::ZERO,
        },
    });
    ctx.manager.manage(Job::new("a", STUB_KIND, test_host()));
    let id = JobId::new("a");

    assert_eq!(ctx.manager.retry(&id, Action::Deploy, "eof"), JobStatus::Retrying);
    assert_eq!(ctx.manager.retry_count(&id), 1);
    assert_eq!(ctx.manager.retry(&id, Action::Deploy, "eof"), JobStatus::Failed);
    assert_eq!(ctx.manager.retry_count(&id), 0);
    assert_eq!(ctx.manager.get(&id).unwrap().status, JobStatus::Failed);
}
