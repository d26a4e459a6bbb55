// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection provider backed by the OpenSSH client binary

use super::{CommandOutput, Connection, ConnectionError, ConnectionProvider};
use crate::subprocess::{run_with_timeout, SubprocessError, SSH_COMMAND_TIMEOUT, SSH_CONNECT_TIMEOUT};
use async_trait::async_trait;
use rj_core::Host;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// ssh reserves this exit status for its own failures.
const SSH_ERROR_EXIT: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Client binary, `ssh` unless overridden
    pub binary: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            connect_timeout: SSH_CONNECT_TIMEOUT,
            command_timeout: SSH_COMMAND_TIMEOUT,
        }
    }
}

/// Opens [`SshConnection`]s in batch mode (no password prompts).
#[derive(Debug, Clone, Default)]
pub struct SshProvider {
    config: SshConfig,
}

impl SshProvider {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionProvider for SshProvider {
    async fn connect(&self, host: &Host) -> Result<Arc<dyn Connection>, ConnectionError> {
        let conn = SshConnection {
            host: host.clone(),
            config: self.config.clone(),
        };

        // Probe once so credential problems surface at connect time
        let probe = conn.exec("true", self.config.connect_timeout).await?;
        if !probe.success() {
            tracing::warn!(
                host = %host,
                stderr = %probe.stderr.trim(),
                "opening command exited non-zero"
            );
        }
        Ok(Arc::new(conn))
    }
}

/// A host reachable through `ssh`.
///
/// Each command is its own ssh invocation, so the host's opening command is
/// prefixed to every command rather than run once up front.
#[derive(Debug, Clone)]
pub struct SshConnection {
    host: Host,
    config: SshConfig,
}

impl SshConnection {
    fn remote_command(&self, command: &str) -> String {
        match self.host.opening_command.as_deref().map(str::trim) {
            Some(opening) if !opening.is_empty() => format!("{opening} && {command}"),
            _ => command.to_string(),
        }
    }

    fn build(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout.as_secs().max(1)
            ));
        if let Some(port) = self.host.port {
            cmd.arg("-p").arg(port.to_string());
        }
        for (key, value) in &self.host.options {
            cmd.arg("-o").arg(format!("{key}={value}"));
        }
        cmd.arg(format!("{}@{}", self.host.user, self.host.hostname))
            .arg("--")
            .arg(self.remote_command(command));
        cmd
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ConnectionError> {
        let output = run_with_timeout(self.build(command), timeout, "ssh")
            .await
            .map_err(|e| match e {
                SubprocessError::Spawn(msg) => ConnectionError::Transport(msg),
                SubprocessError::TimedOut { description, secs } => {
                    ConnectionError::Timeout { description, secs }
                }
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();
        if exit_code == Some(SSH_ERROR_EXIT) {
            return Err(classify_ssh_failure(&stderr));
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
            exit_code,
        })
    }
}

#[async_trait]
impl Connection for SshConnection {
    async fn run_command(
        &self,
        command: &str,
        verbose: bool,
    ) -> Result<CommandOutput, ConnectionError> {
        let output = self.exec(command, self.config.command_timeout).await?;
        if verbose {
            tracing::info!(
                host = %self.host,
                command,
                exit_code = ?output.exit_code,
                stdout = %output.stdout.trim_end(),
                stderr = %output.stderr.trim_end(),
                "remote command finished"
            );
        }
        Ok(output)
    }
}

/// Map the stderr of a failed ssh invocation (exit 255) onto an error kind.
pub fn classify_ssh_failure(stderr: &str) -> ConnectionError {
    let detail = stderr.trim().to_string();
    if stderr.contains("Host key verification failed")
        || stderr.contains("REMOTE HOST IDENTIFICATION HAS CHANGED")
        || stderr.contains("No matching host key")
    {
        ConnectionError::BadHostKey(detail)
    } else if stderr.contains("Permission denied")
        || stderr.contains("Authentication failed")
        || stderr.contains("Too many authentication failures")
    {
        ConnectionError::Auth(detail)
    } else {
        ConnectionError::Transport(detail)
    }
}

#[cfg(test)]
#[path = "ssh_tests.rs"]
mod tests;
