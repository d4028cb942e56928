// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only operator log for a job (`log.txt`).

use relay_core::time_fmt::format_log_timestamp;
use relay_core::Clock;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const LOG_FILE: &str = "log.txt";

/// Append-only logger for a job's activity log.
///
/// Writes lines formatted `[YYYY-MM-DD HH:MM:SS] message` to `<job_dir>/log.txt`.
/// Each `append()` call opens, writes, and closes the file.
#[derive(Clone)]
pub struct JobLogger<C: Clock> {
    path: PathBuf,
    clock: C,
}

impl<C: Clock> JobLogger<C> {
    pub fn new(job_dir: &Path, clock: C) -> Self {
        Self { path: job_dir.join(LOG_FILE), clock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a log line.
    ///
    /// Failures are logged via tracing but do not propagate; logging
    /// must not break the run.
    pub fn append(&self, message: &str) {
        tracing::info!(target: "relay::job", "{message}");
        if let Err(e) = self.write_line(message) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write job log");
        }
    }

    fn write_line(&self, message: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let ts = format_log_timestamp(self.clock.now());
        for line in message.lines() {
            writeln!(file, "[{ts}] {line}")?;
        }
        if message.is_empty() {
            writeln!(file, "[{ts}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "job_logger_tests.rs"]
mod tests;
