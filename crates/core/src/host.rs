// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote host descriptor

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a job runs and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Login principal on the remote machine
    pub user: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Run once per connection before any job command (e.g. `module load slurm`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_command: Option<String>,
    /// Extra transport options passed through to the connection provider
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, String>,
}

impl Host {
    pub fn new(user: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            hostname: hostname.into(),
            port: None,
            opening_command: None,
            options: IndexMap::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_opening_command(mut self, command: impl Into<String>) -> Self {
        self.opening_command = Some(command.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// `user@hostname[:port]`, used for display and logging
    pub fn key(&self) -> String {
        match self.port {
            Some(port) => format!("{}@{}:{}", self.user, self.hostname, port),
            None => format!("{}@{}", self.user, self.hostname),
        }
    }

    /// Key under which a live connection to this host is cached.
    ///
    /// Covers the whole descriptor: two hosts that differ only in their
    /// opening command or options need separate connections. Options are
    /// sorted so insertion order does not matter.
    pub fn connection_key(&self) -> String {
        let mut key = self.key();
        if let Some(command) = &self.opening_command {
            key.push_str(" ; ");
            key.push_str(command);
        }
        let mut options: Vec<_> = self.options.iter().collect();
        options.sort();
        for (name, value) in options {
            key.push_str(&format!(" -o {name}={value}"));
        }
        key
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
