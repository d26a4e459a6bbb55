// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle notifications

use parking_lot::Mutex;
use rj_core::Job;
use std::fmt;
use std::sync::Arc;

/// Lifecycle notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEvent {
    Managed,
    Modified,
    Deleted,
}

impl JobEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            JobEvent::Managed => "JOB_MANAGED",
            JobEvent::Modified => "JOB_MODIFIED",
            JobEvent::Deleted => "JOB_DELETED",
        }
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Observer = Arc<dyn Fn(&Job, JobEvent) + Send + Sync>;

/// Ordered list of observers.
///
/// Observers run synchronously on the notifying task. The list is cloned
/// before notifying so an observer may subscribe others without deadlock.
#[derive(Default)]
pub struct ObserverBus {
    observers: Mutex<Vec<Observer>>,
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&Job, JobEvent) + Send + Sync + 'static,
    {
        self.observers.lock().push(Arc::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, job: &Job, event: JobEvent) {
        let observers = self.observers.lock().clone();
        for observer in observers {
            observer(job, event);
        }
    }
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
