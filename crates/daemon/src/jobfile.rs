// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job description files accepted by `rjd --submit`.
//!
//! ```toml
//! kind = "batch"
//!
//! [host]
//! user = "alice"
//! hostname = "login.cluster.example"
//! opening_command = "module load slurm"
//!
//! [details]
//! workdir = "/scratch/alice/run1"
//! submit = "sbatch run.sh"
//! ```

use crate::lifecycle::LifecycleError;
use rj_core::Host;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobFile {
    #[serde(default = "default_kind")]
    pub kind: String,
    pub host: Host,
    #[serde(default)]
    pub details: Map<String, Value>,
}

fn default_kind() -> String {
    rj_engine::BATCH_KIND.to_string()
}

impl JobFile {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn read(path: &Path) -> Result<Self, LifecycleError> {
        let text = std::fs::read_to_string(path).map_err(|e| LifecycleError::JobFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&text).map_err(|e| LifecycleError::JobFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "jobfile_tests.rs"]
mod tests;
