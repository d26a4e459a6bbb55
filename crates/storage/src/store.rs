// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk job document for restart recovery.
//!
//! The document is a single JSON object keyed by job id. Every write is a
//! read-merge-write of the whole document, saved atomically (write to `.tmp`,
//! fsync, rename). Missing, empty or corrupt documents read as "no jobs";
//! corrupt ones are moved aside to `.bak` first.

use indexmap::IndexMap;
use parking_lot::Mutex;
use rj_core::{Host, Job, JobId, JobStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while writing the job document
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializable projection of a [`Job`], stored under its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub kind: String,
    pub host: Host,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub traceback: IndexMap<String, String>,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub start_time: Option<u64>,
    #[serde(default)]
    pub end_time: Option<u64>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            kind: job.kind.clone(),
            host: job.host.clone(),
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            traceback: job.traceback.clone(),
            details: job.details.clone(),
            start_time: job.start_time,
            end_time: job.end_time,
        }
    }
}

impl JobRecord {
    /// Rebuild a bare job (no handler) from the stored fields.
    pub fn into_job(self, id: JobId) -> Job {
        Job {
            id,
            kind: self.kind,
            host: self.host,
            status: self.status,
            progress: self.progress,
            message: self.message,
            traceback: self.traceback,
            details: self.details,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

type Document = IndexMap<String, Value>;

/// File-backed job document
pub struct JobStore {
    path: PathBuf,
    // Serializes read-merge-write cycles within the process
    write_lock: Mutex<()>,
}

impl JobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every decodable record, in document order.
    ///
    /// Never fails: unreadable documents and undecodable entries are logged
    /// and skipped.
    pub fn load(&self) -> Vec<(JobId, JobRecord)> {
        let _guard = self.write_lock.lock();
        self.read_document()
            .into_iter()
            .filter_map(|(id, value)| match serde_json::from_value::<JobRecord>(value) {
                Ok(record) => Some((JobId::new(id), record)),
                Err(e) => {
                    warn!(job_id = %id, error = %e, "skipping undecodable job record");
                    None
                }
            })
            .collect()
    }

    /// Replace the stored entry for `job.id` with the job's current projection.
    pub fn persist(&self, job: &Job) -> Result<(), StoreError> {
        let value = serde_json::to_value(JobRecord::from(job))?;
        let _guard = self.write_lock.lock();
        let mut document = self.read_document();
        document.insert(job.id.to_string(), value);
        self.write_document(&document)
    }

    /// Delete the stored entry for `id`. Returns whether an entry existed.
    pub fn remove(&self, id: &JobId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        let mut document = self.read_document();
        if document.shift_remove(id.as_str()).is_none() {
            return Ok(false);
        }
        self.write_document(&document)?;
        Ok(true)
    }

    fn read_document(&self) -> Document {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no job document yet");
                return Document::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable job document, treating as empty");
                return Document::new();
            }
        };

        if contents.trim().is_empty() {
            warn!(path = %self.path.display(), "empty job document, treating as empty");
            return Document::new();
        }

        match serde_json::from_str(&contents) {
            Ok(document) => document,
            Err(e) => {
                let bak_path = rotate_bak_path(&self.path);
                warn!(
                    error = %e,
                    path = %self.path.display(),
                    bak = %bak_path.display(),
                    "corrupt job document, moving to .bak and starting fresh",
                );
                if let Err(e) = fs::rename(&self.path, &bak_path) {
                    warn!(error = %e, "failed to move corrupt job document aside");
                }
                Document::new()
            }
        }
    }

    fn write_document(&self, document: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, document)?;
            writer.flush()?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups; the oldest is removed at capacity.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
