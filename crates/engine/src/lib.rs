// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Remote job orchestration engine

pub mod batch;
mod error;
mod handler;
mod manager;
mod observer;
mod queue;
mod registry;
mod worker;

pub use batch::{BatchHandler, BATCH_KIND, DEFAULT_POLL_INTERVAL};
pub use error::{HandlerError, ManagerError};
pub use handler::{dispatch, HandlerContext, JobHandler};
pub use manager::{JobManager, ManagerConfig, ManagerDeps, RetryPolicy};
pub use observer::{JobEvent, Observer, ObserverBus};
pub use queue::{EventQueue, EventReceiver};
pub use registry::{HandlerFactory, HandlerRegistry, ManagedJob};
pub use worker::{Worker, WorkerHandle};

#[cfg(test)]
mod test_helpers;
