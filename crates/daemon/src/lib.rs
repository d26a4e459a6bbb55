// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote job daemon library
//!
//! Startup, configuration and job-file handling for `rjd`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod jobfile;
pub mod lifecycle;
pub mod settings;

pub use jobfile::JobFile;
pub use lifecycle::{Config, DaemonState, LifecycleError};
pub use settings::Settings;
