// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default bound on establishing an ssh session.
pub const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on a single remote command (submission, status query, cancel).
pub const SSH_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Why a subprocess produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubprocessError {
    /// The process could not be started or awaited
    Spawn(String),
    /// The timeout elapsed; the child is killed on drop
    TimedOut { description: String, secs: u64 },
}

/// Run a subprocess command with a timeout.
///
/// A non-zero exit status is not an error here; callers inspect
/// `Output::status` themselves.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, SubprocessError> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(SubprocessError::Spawn(format!(
            "{} failed: {}",
            description, io_err
        ))),
        Err(_elapsed) => Err(SubprocessError::TimedOut {
            description: description.to_string(),
            secs: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
