//! Test helpers for behavioral specifications.
//!
//! Provides a small DSL for running rjd against an isolated state directory
//! with a loopback `ssh` and fake scheduler tools.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::io::{BufRead, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};

// Spec polling timeouts
pub const SPEC_POLL_INTERVAL_MS: u64 = 10;
pub const SPEC_WAIT_MAX_MS: u64 = 5000;

/// Runs the last argument locally, standing in for `ssh user@host -- cmd`.
const LOOPBACK_SSH: &str = r#"#!/bin/sh
for a; do last=$a; done
exec sh -c "$last"
"#;

/// Returns the path to a binary, checking llvm-cov target directory first.
/// Falls back to resolving relative to the test binary itself when
/// CARGO_MANIFEST_DIR is stale.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    // The test binary lives at target/debug/deps/specs-<hash>, so its
    // grandparent is target/debug/ where rjd is built.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

/// Returns the path to the rjd daemon binary.
pub fn rjd_binary() -> PathBuf {
    binary_path("rjd")
}

/// Create a builder for rjd invocations
pub fn rjd() -> RjdBuilder {
    RjdBuilder::new()
}

/// High-level builder for fluent test assertions
pub struct RjdBuilder {
    args: Vec<String>,
    envs: Vec<(String, String)>,
    path_prefix: Option<PathBuf>,
}

impl RjdBuilder {
    fn new() -> Self {
        Self {
            args: Vec::new(),
            envs: vec![("RUST_LOG".into(), "info".into())],
            path_prefix: None,
        }
    }

    /// Add arguments
    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Set environment variable
    pub fn env(mut self, key: &str, value: impl AsRef<Path>) -> Self {
        self.envs.push((
            key.to_string(),
            value.as_ref().to_string_lossy().to_string(),
        ));
        self
    }

    /// Put `dir` in front of PATH
    pub fn path_prefix(mut self, dir: impl Into<PathBuf>) -> Self {
        self.path_prefix = Some(dir.into());
        self
    }

    /// Build the command without running it
    pub fn command(self) -> Command {
        let mut cmd = Command::new(rjd_binary());
        cmd.args(&self.args);

        // Keep the parent's overrides from leaking into tests
        cmd.env_remove("RJ_STATE_DIR")
            .env_remove("RJ_RETRY_MAX")
            .env_remove("RJ_RETRY_DELAY_MS");

        if let Some(prefix) = self.path_prefix {
            let path = std::env::var("PATH").unwrap_or_default();
            cmd.env("PATH", format!("{}:{path}", prefix.display()));
        }

        for (key, value) in self.envs {
            cmd.env(key, value);
        }

        cmd
    }

    /// Run and expect success (exit code 0)
    pub fn passes(self) -> RunAssert {
        let output = self.command().output().expect("command should run");
        assert!(
            output.status.success(),
            "expected command to pass, got exit code {:?}\nstdout: {}\nstderr: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }

    /// Run and expect failure (non-zero exit code)
    pub fn fails(self) -> RunAssert {
        let output = self.command().output().expect("command should run");
        assert!(
            !output.status.success(),
            "expected command to fail, but it passed\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }

    /// Start the daemon and wait for its READY line.
    ///
    /// Panics if the daemon exits before signalling readiness.
    pub fn start(self) -> Daemon {
        let mut child = self
            .command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("rjd should spawn");

        let stdout = child.stdout.take().expect("stdout is piped");
        let mut first_line = String::new();
        BufReader::new(stdout).read_line(&mut first_line).unwrap();
        if first_line.trim() != "READY" {
            let output = child.wait_with_output().unwrap();
            panic!(
                "rjd did not become ready: {:?}\nstdout: {first_line}\nstderr: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Daemon { child: Some(child) }
    }
}

/// Result of an rjd run for chaining assertions
pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn code(&self) -> Option<i32> {
        self.output.status.code()
    }

    /// Assert stdout equals expected exactly (with diff on failure).
    pub fn stdout_eq(self, expected: &str) -> Self {
        let stdout = self.stdout();
        similar_asserts::assert_eq!(stdout, expected);
        self
    }

    /// Assert stdout contains substring.
    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            stdout.contains(expected),
            "stdout does not contain '{}'\nstdout: {}",
            expected,
            stdout
        );
        self
    }

    /// Assert stderr contains substring.
    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(
            stderr.contains(expected),
            "stderr does not contain '{}'\nstderr: {}",
            expected,
            stderr
        );
        self
    }
}

/// A running rjd process. Killed on drop if still alive.
pub struct Daemon {
    child: Option<Child>,
}

impl Daemon {
    pub fn pid(&self) -> u32 {
        self.child.as_ref().map(Child::id).unwrap_or_default()
    }

    /// Send SIGTERM and wait for a clean exit
    pub fn terminate(mut self) -> std::process::ExitStatus {
        let mut child = self.child.take().expect("daemon is running");
        Command::new("kill")
            .args(["-TERM", &child.id().to_string()])
            .status()
            .expect("kill should run");
        child.wait().expect("daemon should exit")
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

// =============================================================================
// Polling
// =============================================================================

/// Poll a condition until it returns true or timeout is reached.
pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);
    let poll_interval = std::time::Duration::from_millis(SPEC_POLL_INTERVAL_MS);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(poll_interval);
    }
    false
}

// =============================================================================
// Project
// =============================================================================

/// Isolated state directory, scratch space and tool directory for one test.
pub struct Project {
    /// Job files and the fake remote working directory
    dir: tempfile::TempDir,
    /// Isolated state directory (RJ_STATE_DIR)
    state_dir: tempfile::TempDir,
    /// Fake `ssh`, `squeue` and friends
    bin_dir: tempfile::TempDir,
}

impl Project {
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            state_dir: tempfile::tempdir().unwrap(),
            bin_dir: tempfile::tempdir().unwrap(),
        }
    }

    /// A project whose `ssh` runs commands locally and whose config points
    /// at it, with fast retry and poll intervals.
    pub fn loopback() -> Self {
        let project = Self::empty();
        let ssh = project.tool("ssh", LOOPBACK_SSH);
        project.config(&format!(
            "[retry]\nmax_attempts = 2\ndelay_ms = 50\n\n[ssh]\nbinary = \"{}\"\n\n[batch]\npoll_interval_ms = 50\n",
            ssh.display()
        ));
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn state_path(&self) -> &Path {
        self.state_dir.path()
    }

    /// Write a file under the project directory (parents created)
    pub fn file(&self, path: impl AsRef<Path>, content: &str) -> PathBuf {
        let full_path = self.dir.path().join(path.as_ref());
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full_path, content).unwrap();
        full_path
    }

    /// Write `config.toml` into the state directory
    pub fn config(&self, content: &str) {
        std::fs::write(self.state_path().join("config.toml"), content).unwrap();
    }

    /// Install an executable script on the daemon's PATH
    pub fn tool(&self, name: &str, script: &str) -> PathBuf {
        let path = self.bin_dir.path().join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// A batch job file for the loopback host running `submit` in the
    /// project directory
    pub fn batch_job(&self, name: &str, submit: &str) -> PathBuf {
        self.file(
            name,
            &format!(
                "kind = \"batch\"\n\n[host]\nuser = \"tester\"\nhostname = \"localhost\"\n\n[details]\nworkdir = \"{}\"\nsubmit = \"{}\"\n",
                self.path().display(),
                submit
            ),
        )
    }

    /// rjd with this project's state directory and tools
    pub fn rjd(&self) -> RjdBuilder {
        rjd()
            .env("RJ_STATE_DIR", self.state_path())
            .path_prefix(self.bin_dir.path())
    }

    /// Read the daemon log file contents (for debugging test failures)
    pub fn daemon_log(&self) -> String {
        let log_path = self.state_path().join("daemon.log");
        std::fs::read_to_string(&log_path).unwrap_or_else(|_| "(no daemon log)".to_string())
    }

    /// The persisted job document, or an empty object
    pub fn jobs(&self) -> serde_json::Map<String, serde_json::Value> {
        std::fs::read_to_string(self.state_path().join("jobs.json"))
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    /// Status of every persisted job
    pub fn job_statuses(&self) -> Vec<String> {
        self.jobs()
            .values()
            .filter_map(|job| job["status"].as_str().map(str::to_string))
            .collect()
    }
}
