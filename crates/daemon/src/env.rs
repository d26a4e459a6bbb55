// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: RJ_STATE_DIR > XDG_STATE_HOME/rj > ~/.local/state/rj
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("RJ_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("rj"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/rj"))
}

/// Retry bound override. `0` retries forever.
pub fn retry_max() -> Option<u32> {
    std::env::var("RJ_RETRY_MAX")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
}

/// Retry delay override in milliseconds
pub fn retry_delay_ms() -> Option<u64> {
    std::env::var("RJ_RETRY_DELAY_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
