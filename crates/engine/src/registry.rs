// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler factories keyed by job kind

use crate::error::HandlerError;
use crate::handler::JobHandler;
use parking_lot::RwLock;
use rj_core::Job;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds the handler for a job of one kind
pub type HandlerFactory =
    Arc<dyn Fn(&Job) -> Result<Arc<dyn JobHandler>, HandlerError> + Send + Sync>;

/// A job paired with the handler that drives it.
///
/// Jobs read back from disk have no handler until they are resumed.
#[derive(Clone)]
pub struct ManagedJob {
    pub job: Job,
    pub handler: Option<Arc<dyn JobHandler>>,
}

impl ManagedJob {
    pub fn new(job: Job, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            job,
            handler: Some(handler),
        }
    }

    /// A job with no handler attached
    pub fn bare(job: Job) -> Self {
        Self { job, handler: None }
    }

    pub fn is_mounted(&self) -> bool {
        self.handler.is_some()
    }
}

impl From<Job> for ManagedJob {
    fn from(job: Job) -> Self {
        Self::bare(job)
    }
}

impl fmt::Debug for ManagedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedJob")
            .field("job", &self.job)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

/// Maps job kinds to handler factories.
///
/// Mounting a job of an unregistered kind leaves it unchanged.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: RwLock<HashMap<String, HandlerFactory>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `kind`
    pub fn register<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Job) -> Result<Arc<dyn JobHandler>, HandlerError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        tracing::debug!(%kind, "registering handler factory");
        self.factories.write().insert(kind, Arc::new(factory));
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.factories.read().contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Attach a handler to `job` using the factory registered for its kind.
    pub fn mount(&self, job: Job) -> Result<ManagedJob, HandlerError> {
        let factory = self.factories.read().get(&job.kind).cloned();
        match factory {
            Some(factory) => {
                let handler = factory(&job)?;
                Ok(ManagedJob::new(job, handler))
            }
            None => Ok(ManagedJob::bare(job)),
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
