// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for handlers and the job manager

use rj_adapters::{ConnectionError, SchedulerError};
use rj_core::{Action, JobId};
use thiserror::Error;

/// Errors returned by a handler action
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("action {0} is not supported by this handler")]
    Unsupported(Action),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("missing detail: {0}")]
    MissingDetail(String),
    #[error("unexpected remote output: {0}")]
    RemoteOutput(String),
    #[error("cannot build handler: {0}")]
    Factory(String),
}

impl HandlerError {
    /// The underlying connection error, if the action failed in transport.
    pub fn connection_error(&self) -> Option<&ConnectionError> {
        match self {
            HandlerError::Connection(e) => Some(e),
            HandlerError::Scheduler(SchedulerError::Connection(e)) => Some(e),
            _ => None,
        }
    }
}

/// Errors surfaced by [`crate::JobManager`]
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("failed to mount job {id} of kind {kind}: {source}")]
    Mount {
        id: JobId,
        kind: String,
        #[source]
        source: HandlerError,
    },
    #[error("{action} for job {id} failed: {source}")]
    Handler {
        id: JobId,
        action: Action,
        #[source]
        source: HandlerError,
    },
    #[error("job {id} has no handler attached")]
    Unmounted { id: JobId },
    #[error("no handler registered for kind {0}")]
    UnknownKind(String),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("worker loop already started")]
    AlreadyStarted,
}
