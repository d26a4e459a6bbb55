// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote Jobs Daemon (rjd)
//!
//! Background process that owns the job manager and its worker loop.
//!
//! Architecture:
//! - Worker Task: drains the event queue, one action at a time
//! - Main Task: submits job files, then waits for a termination signal

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::{Path, PathBuf};

use rj_daemon::lifecycle::{self, Config, LifecycleError};
use rj_daemon::JobFile;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the command line asked for
#[derive(Debug, PartialEq)]
enum Invocation {
    Help,
    Version,
    Run { submit: Vec<PathBuf> },
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Invocation, String> {
    let mut submit = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" | "-v" => return Ok(Invocation::Version),
            "--help" | "-h" | "help" => return Ok(Invocation::Help),
            "--submit" | "-s" => match args.next() {
                Some(path) => submit.push(PathBuf::from(path)),
                None => return Err(format!("'{arg}' requires a job file")),
            },
            _ => return Err(format!("unexpected argument '{arg}'")),
        }
    }
    Ok(Invocation::Run { submit })
}

fn print_help() {
    println!("rjd {VERSION}");
    println!("Remote Jobs Daemon - deploys, polls and cancels jobs on remote hosts over ssh");
    println!();
    println!("USAGE:");
    println!("    rjd [--submit <job.toml>]...");
    println!();
    println!("Jobs persisted in the state directory are resumed on startup.");
    println!("The state directory is $RJ_STATE_DIR, else $XDG_STATE_HOME/rj,");
    println!("else ~/.local/state/rj.");
    println!();
    println!("OPTIONS:");
    println!("    -s, --submit <FILE>  Submit the job described by FILE (repeatable)");
    println!("    -h, --help           Print help information");
    println!("    -v, --version        Print version information");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    let submit = match parse_args(std::env::args().skip(1)) {
        Ok(Invocation::Version) => {
            println!("rjd {VERSION}");
            return Ok(());
        }
        Ok(Invocation::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Invocation::Run { submit }) => submit,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("Usage: rjd [--help | --version | --submit <job.toml>...]");
            std::process::exit(1);
        }
    };

    let config = Config::load()?;

    // Reject bad job files before touching the lock or the log
    let mut jobs = Vec::with_capacity(submit.len());
    for path in &submit {
        match JobFile::read(path) {
            Ok(job) => jobs.push(job),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
    }

    rotate_log_if_needed(&config.log_path);

    // Write startup marker to log (before tracing setup, so it lands first)
    write_startup_marker(&config)?;

    let log_guard = setup_logging(&config)?;

    info!("Starting remote jobs daemon");

    let daemon = match lifecycle::startup(&config).await {
        Ok(daemon) => daemon,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("rjd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            write_startup_error(&config, &e);
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    for job in jobs {
        if let Err(e) = daemon.submit(job) {
            error!("Failed to submit job: {}", e);
            eprintln!("error: {e}");
        }
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        jobs = daemon.manager.jobs().len(),
        state_dir = %config.state_dir.display(),
        "Daemon ready"
    );

    // Signal ready for a parent process waiting on startup
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
    }

    daemon.shutdown().await?;
    info!("Daemon stopped");
    Ok(())
}

/// Rotate once the log passes this size
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated copies kept next to the live log (`daemon.log.1` is newest)
const MAX_ROTATIONS: u32 = 3;

/// Shift `daemon.log` to `daemon.log.1` when it is too large, keeping at
/// most [`MAX_ROTATIONS`] old copies. Errors are ignored.
fn rotate_log_if_needed(log_path: &Path) {
    let Ok(meta) = std::fs::metadata(log_path) else {
        return;
    };
    if meta.len() <= MAX_LOG_SIZE {
        return;
    }
    let rotated = |n: u32| {
        let mut name = log_path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    };
    let _ = std::fs::remove_file(rotated(MAX_ROTATIONS));
    for n in (1..MAX_ROTATIONS).rev() {
        let from = rotated(n);
        if from.exists() {
            let _ = std::fs::rename(&from, rotated(n + 1));
        }
    }
    let _ = std::fs::rename(log_path, rotated(1));
}

/// Startup marker prefix written to log before anything else.
/// Full format: "--- rjd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- rjd: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously to log file.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
