//! Daemon lifecycle specs
//!
//! Startup validation, the single-instance lock and clean shutdown.

use crate::prelude::*;

#[test]
fn malformed_config_refuses_to_start() {
    let temp = Project::empty();
    temp.config("[retry]\nmax_attempts = \"often\"\n");

    temp.rjd().fails().stderr_has("config.toml");
    assert!(!temp.state_path().join("daemon.pid").exists());
}

#[test]
fn unknown_config_key_refuses_to_start() {
    let temp = Project::empty();
    temp.config("[retry]\nbackoff = 2\n");

    temp.rjd().fails().stderr_has("backoff");
}

#[test]
fn unreadable_job_file_exits_before_locking() {
    let temp = Project::empty();
    let missing = temp.path().join("nope.toml");

    let run = temp
        .rjd()
        .args(&["--submit", missing.to_str().unwrap()])
        .fails();

    assert_eq!(run.code(), Some(1));
    run.stderr_has("nope.toml");
    assert!(!temp.state_path().join("daemon.pid").exists());
}

#[test]
fn job_file_without_host_is_rejected() {
    let temp = Project::empty();
    let job = temp.file("job.toml", "kind = \"batch\"\n");

    temp.rjd()
        .args(&["--submit", job.to_str().unwrap()])
        .fails()
        .stderr_has("host");
}

#[test]
fn daemon_writes_pid_and_removes_it_on_sigterm() {
    let temp = Project::loopback();
    let daemon = temp.rjd().start();
    let pid_path = temp.state_path().join("daemon.pid");

    let pid = std::fs::read_to_string(&pid_path).unwrap();
    assert_eq!(pid.trim(), daemon.pid().to_string());

    let status = daemon.terminate();

    assert!(status.success(), "log:\n{}", temp.daemon_log());
    assert!(!pid_path.exists());
    assert!(temp.daemon_log().contains("--- rjd: starting (pid: "));
}

#[test]
fn second_daemon_reports_running_instance() {
    let temp = Project::loopback();
    let daemon = temp.rjd().start();

    let run = temp.rjd().fails();

    assert_eq!(run.code(), Some(1));
    run.stderr_has("rjd is already running")
        .stderr_has(&format!("pid: {}", daemon.pid()));
    assert!(daemon.terminate().success());
}
