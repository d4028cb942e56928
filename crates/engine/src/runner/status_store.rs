// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job status document, shared by every lane of a run.

use crate::persist;
use parking_lot::Mutex;
use relay_core::time_fmt::format_rfc3339;
use relay_core::{Clock, JobStatus, StepState};
use std::path::{Path, PathBuf};

pub const STATUS_FILE: &str = "status.json";

/// Guarded job status. Every mutation is written through to `status.json`
/// while the guard is held, so concurrent lanes never interleave writes.
pub(crate) struct StatusStore<C: Clock> {
    path: PathBuf,
    inner: Mutex<JobStatus>,
    clock: C,
}

impl<C: Clock> StatusStore<C> {
    pub(crate) fn new(job_dir: &Path, status: JobStatus, clock: C) -> Self {
        Self { path: job_dir.join(STATUS_FILE), inner: Mutex::new(status), clock }
    }

    pub(crate) fn now(&self) -> String {
        format_rfc3339(self.clock.now())
    }

    /// Mutate and persist.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut JobStatus) -> R) -> R {
        let mut status = self.inner.lock();
        let result = f(&mut status);
        status.updated_at = self.now();
        if let Err(e) = persist::write_json(&self.path, &*status) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist job status");
        }
        result
    }

    /// Mutate one step's entry, stamping its `updated_at`.
    pub(crate) fn update_step<R>(&self, step_id: &str, f: impl FnOnce(&mut StepState) -> R) -> R {
        let now = self.now();
        self.update(|status| {
            let entry = status.step_mut(step_id);
            let result = f(entry);
            entry.updated_at = now;
            result
        })
    }

    pub(crate) fn snapshot(&self) -> JobStatus {
        self.inner.lock().clone()
    }

    pub(crate) fn step_attempts(&self, step_id: &str) -> u32 {
        self.inner.lock().attempts(step_id)
    }

    pub(crate) fn step_error(&self, step_id: &str) -> Option<String> {
        self.inner.lock().step(step_id).and_then(|s| s.last_error.clone())
    }

    pub(crate) fn is_completed(&self, step_id: &str) -> bool {
        self.inner.lock().is_completed(step_id)
    }
}

/// Read a previous run's status, starting fresh if it is missing or unreadable.
pub(crate) fn load_status(job_dir: &Path) -> JobStatus {
    let path = job_dir.join(STATUS_FILE);
    match persist::read_json::<JobStatus>(&path) {
        Ok(Some(status)) => status,
        Ok(None) => JobStatus::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable job status, starting fresh");
            JobStatus::default()
        }
    }
}
