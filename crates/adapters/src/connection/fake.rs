// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake connection provider for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{CommandOutput, Connection, ConnectionError, ConnectionProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use rj_core::Host;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Connect { host: String },
    Run { host: String, command: String },
}

type Scripted = Result<CommandOutput, ConnectionError>;

#[derive(Default)]
struct FakeState {
    calls: Vec<ProviderCall>,
    /// Per host key; popped one per connect attempt
    connect_failures: HashMap<String, VecDeque<ConnectionError>>,
    /// (substring, responses); the last response repeats
    responses: Vec<(String, VecDeque<Scripted>)>,
}

/// Fake provider with scripted command responses.
///
/// Commands with no matching script succeed with empty output.
#[derive(Clone, Default)]
pub struct FakeConnectionProvider {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeConnectionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.inner.lock().calls.clone()
    }

    /// Commands run so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ProviderCall::Run { command, .. } => Some(command.clone()),
                ProviderCall::Connect { .. } => None,
            })
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ProviderCall::Connect { .. }))
            .count()
    }

    /// Fail the next connect to `host` with `error`.
    pub fn fail_connect(&self, host: &Host, error: ConnectionError) {
        self.inner
            .lock()
            .connect_failures
            .entry(host.key())
            .or_default()
            .push_back(error);
    }

    /// Respond to commands containing `pattern` with `output`.
    pub fn respond(&self, pattern: &str, output: CommandOutput) {
        self.script(pattern, vec![Ok(output)]);
    }

    /// Respond to commands containing `pattern` with each result in turn;
    /// the final one repeats.
    pub fn script(&self, pattern: &str, results: Vec<Scripted>) {
        self.inner
            .lock()
            .responses
            .push((pattern.to_string(), results.into_iter().collect()));
    }

    fn run(&self, host: &str, command: &str) -> Scripted {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::Run {
            host: host.to_string(),
            command: command.to_string(),
        });

        // Later scripts take priority over earlier ones
        for (pattern, results) in inner.responses.iter_mut().rev() {
            if command.contains(pattern.as_str()) {
                return match results.len() {
                    0 => Ok(CommandOutput::default()),
                    1 => results.front().cloned().unwrap_or_else(|| Ok(CommandOutput::default())),
                    _ => results.pop_front().unwrap_or_else(|| Ok(CommandOutput::default())),
                };
            }
        }
        Ok(CommandOutput::default())
    }
}

#[async_trait]
impl ConnectionProvider for FakeConnectionProvider {
    async fn connect(&self, host: &Host) -> Result<Arc<dyn Connection>, ConnectionError> {
        let key = host.key();
        {
            let mut inner = self.inner.lock();
            inner.calls.push(ProviderCall::Connect { host: key.clone() });
            if let Some(error) = inner
                .connect_failures
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
            {
                return Err(error);
            }
        }
        Ok(Arc::new(FakeConnection {
            host: key,
            provider: self.clone(),
        }))
    }
}

struct FakeConnection {
    host: String,
    provider: FakeConnectionProvider,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn run_command(
        &self,
        command: &str,
        _verbose: bool,
    ) -> Result<CommandOutput, ConnectionError> {
        self.provider.run(&self.host, command)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
