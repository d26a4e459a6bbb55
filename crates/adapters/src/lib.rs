// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for remote hosts: connections and scheduler status

pub mod connection;
pub mod scheduler;
pub mod subprocess;
pub mod traced;

pub use connection::{
    CommandOutput, Connection, ConnectionError, ConnectionProvider, SshConfig, SshProvider,
};
pub use scheduler::{RemoteState, SchedulerError, SchedulerReport, SchedulerStatus, SlurmStatus};
pub use traced::{TracedConnection, TracedProvider};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use connection::{FakeConnectionProvider, ProviderCall};
#[cfg(any(test, feature = "test-support"))]
pub use scheduler::FakeSchedulerStatus;
