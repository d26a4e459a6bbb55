// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue events and the closed set of actions they carry

use crate::job::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Step requested of a job's handler.
///
/// Serializes with the upper-case wire names (`"DEPLOY"`, `"PROGRESS"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// First-time submission to the remote scheduler
    Deploy,
    /// Poll remote status
    Progress,
    /// Best-effort remote termination and cleanup
    Cancel,
    /// Fetch and interpret results; never changes status
    Collect,
    /// Stops the worker loop; never reaches a handler
    Shutdown,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Deploy => "DEPLOY",
            Action::Progress => "PROGRESS",
            Action::Cancel => "CANCEL",
            Action::Collect => "COLLECT",
            Action::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEPLOY" => Ok(Action::Deploy),
            "PROGRESS" => Ok(Action::Progress),
            "CANCEL" => Ok(Action::Cancel),
            "COLLECT" => Ok(Action::Collect),
            "SHUTDOWN" => Ok(Action::Shutdown),
            _ => Err(UnknownAction(s.to_string())),
        }
    }
}

/// One entry on the event queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub job_id: JobId,
    pub action: Action,
    /// Optional keyword arguments forwarded to the handler
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Event {
    pub fn new(job_id: JobId, action: Action) -> Self {
        Self {
            job_id,
            action,
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// The sentinel that stops the worker loop
    pub fn shutdown() -> Self {
        Self::new(JobId::new(""), Action::Shutdown)
    }

    pub fn is_shutdown(&self) -> bool {
        self.action == Action::Shutdown
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
