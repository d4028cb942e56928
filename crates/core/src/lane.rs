// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lane documents: manifest, status, lock and metrics.

use crate::time_fmt::{parse_timestamp, seconds_between};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneRunState {
    #[default]
    Idle,
    Running,
    Degraded,
    Completed,
}

crate::simple_display! {
    LaneRunState {
        Idle => "idle",
        Running => "running",
        Degraded => "degraded",
        Completed => "completed",
    }
}

/// Per-lane counters, accumulated across attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneMetrics {
    pub steps_total: u32,
    pub steps_completed: u32,
    pub failed_attempts: u32,
    pub attempts_total: u32,
    pub retries_total: u32,
    pub reroutes_total: u32,
    pub duration_s: f64,
}

/// Static description of a lane (`lane.json`), written at run initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneManifest {
    pub lane_id: String,
    pub target: Option<String>,
    pub step_ids: Vec<String>,
    pub root: PathBuf,
    pub worktree: PathBuf,
    pub artifacts: PathBuf,
    pub run_id: String,
    pub created_at: String,
}

/// Live lane state (`status.json` under the lane directory).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneStatus {
    pub lane_id: String,
    pub target: Option<String>,
    pub state: LaneRunState,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub current_attempt: Option<u32>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub metrics: LaneMetrics,
    #[serde(default)]
    pub updated_at: String,
}

/// Advisory lane lock (`lock.json`).
///
/// Not linearizable. Creating a missing lock is exclusive, but two processes
/// reclaiming the same stale lock can both win.
/// Staleness is judged by wall time so a crashed holder's lock can be
/// reclaimed without a heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneLock {
    pub lane_id: String,
    pub step_id: String,
    pub attempt: u32,
    pub process_id: u32,
    pub acquired_at: String,
}

impl LaneLock {
    /// Seconds since acquisition, `None` if `acquired_at` is unreadable.
    pub fn age_s(&self, now: DateTime<Utc>) -> Option<f64> {
        parse_timestamp(&self.acquired_at).map(|at| seconds_between(at, now))
    }

    /// A lock is stale once older than `stale_after_s`; an unreadable
    /// timestamp counts as stale.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after_s: u64) -> bool {
        match self.age_s(now) {
            Some(age) => age > stale_after_s as f64,
            None => true,
        }
    }
}

#[cfg(test)]
#[path = "lane_tests.rs"]
mod tests;
