// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional `config.toml` in the state directory.
//!
//! ```toml
//! [retry]
//! max_attempts = 5      # 0 retries forever
//! delay_ms = 30000
//!
//! [ssh]
//! binary = "ssh"
//! connect_timeout_secs = 15
//! command_timeout_secs = 120
//!
//! [batch]
//! poll_interval_ms = 30000
//! ```

use rj_adapters::SshConfig;
use rj_engine::{ManagerConfig, RetryPolicy};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub retry: RetrySettings,
    pub ssh: SshSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts.unwrap_or(0),
            delay_ms: policy.delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshSettings {
    pub binary: String,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        let config = SshConfig::default();
        Self {
            binary: config.binary,
            connect_timeout_secs: config.connect_timeout.as_secs(),
            command_timeout_secs: config.command_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSettings {
    pub poll_interval_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: rj_engine::DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl Settings {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `RJ_RETRY_MAX` / `RJ_RETRY_DELAY_MS` on top of the file
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(max) = crate::env::retry_max() {
            self.retry.max_attempts = max;
        }
        if let Some(delay) = crate::env::retry_delay_ms() {
            self.retry.delay_ms = delay;
        }
        self
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            retry: RetryPolicy {
                max_attempts: Some(self.retry.max_attempts).filter(|n| *n > 0),
                delay: Duration::from_millis(self.retry.delay_ms),
            },
        }
    }

    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            binary: self.ssh.binary.clone(),
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.ssh.command_timeout_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.batch.poll_interval_ms)
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
