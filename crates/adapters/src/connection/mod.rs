// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote shell connections to job hosts

mod ssh;

pub use ssh::{classify_ssh_failure, SshConfig, SshConnection, SshProvider};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeConnectionProvider, ProviderCall};

use async_trait::async_trait;
use rj_core::Host;
use std::sync::Arc;
use thiserror::Error;

/// Errors from connecting to a host or running a command on it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("host key verification failed: {0}")]
    BadHostKey(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{description} timed out after {secs}s")]
    Timeout { description: String, secs: u64 },
}

impl ConnectionError {
    /// Credential problems that retrying will not fix.
    pub fn is_credential(&self) -> bool {
        matches!(self, ConnectionError::Auth(_) | ConnectionError::BadHostKey(_))
    }
}

/// Captured output of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Remote exit status, when the transport reports one
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: Some(0),
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code.unwrap_or(0) == 0
    }
}

/// An established session on a host
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run `command` in a remote shell. `verbose` logs the full output.
    async fn run_command(&self, command: &str, verbose: bool)
        -> Result<CommandOutput, ConnectionError>;
}

/// Opens connections to hosts
#[async_trait]
pub trait ConnectionProvider: Send + Sync + 'static {
    async fn connect(&self, host: &Host) -> Result<Arc<dyn Connection>, ConnectionError>;
}
