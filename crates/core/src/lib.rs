// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rj-core: data model for the remote job orchestrator

pub mod clock;
pub mod event;
pub mod host;
pub mod id;
pub mod job;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{Action, Event, UnknownAction};
pub use host::Host;
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use job::{Job, JobId, JobStatus, StateUpdate, UnknownStatus};
