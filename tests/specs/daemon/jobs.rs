//! End-to-end job specs
//!
//! Jobs run through a loopback `ssh` that executes commands locally, with a
//! fake `squeue` standing in for the scheduler.

use crate::prelude::*;

/// `squeue` that reports nothing, so every tracked job reads as finished
const SQUEUE_EMPTY: &str = "#!/bin/sh\nexit 0\n";

/// `squeue` that keeps job 4242 running forever
const SQUEUE_RUNNING: &str = "#!/bin/sh\necho '4242 RUNNING'\n";

#[test]
fn submitted_job_completes_and_is_persisted() {
    let temp = Project::loopback();
    temp.tool("squeue", SQUEUE_EMPTY);
    let job = temp.batch_job("job.toml", "echo Submitted batch job 4242");

    let daemon = temp
        .rjd()
        .args(&["--submit", job.to_str().unwrap()])
        .start();

    let completed = wait_for(SPEC_WAIT_MAX_MS, || {
        temp.job_statuses() == ["COMPLETED".to_string()]
    });
    assert!(completed, "jobs: {:?}\nlog:\n{}", temp.jobs(), temp.daemon_log());

    let jobs = temp.jobs();
    let record = jobs.values().next().unwrap();
    assert_eq!(record["details"]["scheduler_ids"], serde_json::json!(["4242"]));
    assert_eq!(record["progress"], serde_json::json!(100.0));
    assert!(daemon.terminate().success());
}

#[test]
fn rejected_submission_fails_the_job() {
    let temp = Project::loopback();
    temp.tool("squeue", SQUEUE_EMPTY);
    let job = temp.batch_job("job.toml", "echo no partition >&2; exit 3");

    let daemon = temp
        .rjd()
        .args(&["--submit", job.to_str().unwrap()])
        .start();

    let failed = wait_for(SPEC_WAIT_MAX_MS, || {
        temp.job_statuses() == ["FAILED".to_string()]
    });
    assert!(failed, "jobs: {:?}\nlog:\n{}", temp.jobs(), temp.daemon_log());

    let jobs = temp.jobs();
    let record = jobs.values().next().unwrap();
    let traceback = record["traceback"]["deploy"].as_str().unwrap();
    assert!(traceback.contains("no partition"), "{traceback}");
    assert!(daemon.terminate().success());
}

#[test]
fn restart_resumes_a_running_job() {
    let temp = Project::loopback();
    temp.tool("squeue", SQUEUE_RUNNING);
    let job = temp.batch_job("job.toml", "echo Submitted batch job 4242");

    let daemon = temp
        .rjd()
        .args(&["--submit", job.to_str().unwrap()])
        .start();
    let running = wait_for(SPEC_WAIT_MAX_MS, || {
        temp.job_statuses() == ["RUNNING".to_string()]
    });
    assert!(running, "jobs: {:?}\nlog:\n{}", temp.jobs(), temp.daemon_log());
    assert!(daemon.terminate().success());

    // The remote job finishes while the daemon is down
    temp.tool("squeue", SQUEUE_EMPTY);
    let daemon = temp.rjd().start();

    let completed = wait_for(SPEC_WAIT_MAX_MS, || {
        temp.job_statuses() == ["COMPLETED".to_string()]
    });
    assert!(completed, "jobs: {:?}\nlog:\n{}", temp.jobs(), temp.daemon_log());
    assert_eq!(temp.jobs().len(), 1);
    assert!(daemon.terminate().success());
}

#[test]
fn unreachable_host_gives_up_after_retries() {
    let temp = Project::loopback();
    // ssh exits 255 without a credential message: a transport failure
    let ssh = temp.tool("ssh", "#!/bin/sh\necho 'Connection refused' >&2\nexit 255\n");
    temp.config(&format!(
        "[retry]\nmax_attempts = 2\ndelay_ms = 20\n\n[ssh]\nbinary = \"{}\"\n",
        ssh.display()
    ));
    let job = temp.batch_job("job.toml", "echo Submitted batch job 4242");

    let daemon = temp
        .rjd()
        .args(&["--submit", job.to_str().unwrap()])
        .start();

    let failed = wait_for(SPEC_WAIT_MAX_MS, || {
        temp.job_statuses() == ["FAILED".to_string()]
    });
    assert!(failed, "jobs: {:?}\nlog:\n{}", temp.jobs(), temp.daemon_log());

    let jobs = temp.jobs();
    let record = jobs.values().next().unwrap();
    assert!(record["message"]
        .as_str()
        .unwrap()
        .contains("gave up after 2 retries"));
    assert!(daemon.terminate().success());
}

#[test]
fn rejected_credentials_leave_the_job_idle() {
    let temp = Project::loopback();
    let ssh = temp.tool(
        "ssh",
        "#!/bin/sh\necho 'tester@localhost: Permission denied (publickey).' >&2\nexit 255\n",
    );
    temp.config(&format!("[ssh]\nbinary = \"{}\"\n", ssh.display()));
    let job = temp.batch_job("job.toml", "echo Submitted batch job 4242");

    let daemon = temp
        .rjd()
        .args(&["--submit", job.to_str().unwrap()])
        .start();

    let idle = wait_for(SPEC_WAIT_MAX_MS, || {
        temp.job_statuses() == ["IDLE".to_string()]
    });
    assert!(idle, "jobs: {:?}\nlog:\n{}", temp.jobs(), temp.daemon_log());

    let jobs = temp.jobs();
    let record = jobs.values().next().unwrap();
    assert!(record["traceback"]["connection"]
        .as_str()
        .unwrap()
        .contains("Permission denied"));
    assert!(daemon.terminate().success());
}
