// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lane Runtime Coordinator.
//!
//! Owns the lane topology of a run: per-lane directories and documents,
//! target resolution with health-aware rerouting, advisory lane locks, attempt
//! metrics, and the final run summary.

mod routing;

use crate::config::{ReroutePolicy, RunnerConfig};
use crate::health::load_health_snapshot;
use crate::persist;
use indexmap::IndexMap;
use parking_lot::Mutex;
use relay_core::time_fmt::{format_rfc3339, seconds_between};
use relay_core::{
    Clock, DispatchPlan, HealthSummary, JobState, LaneLock, LaneManifest, LaneMetrics,
    LaneRunState, LaneSpec, LaneStatus, DEFAULT_LANE_ID, SINGLE_LANE_TARGET,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use routing::RouteDecision;

pub const LANES_DIR: &str = "lanes";
pub const LANE_SUMMARY_FILE: &str = "lane_summary.json";
const STATUS_FILE: &str = "status.json";
const LOCK_FILE: &str = "lock.json";
const MANIFEST_FILE: &str = "lane.json";

#[derive(Debug, Error)]
pub enum LaneError {
    #[error("unknown lane: {0}")]
    UnknownLane(String),
    #[error("lane {lane_id} is locked by step {step_id} attempt {attempt} (pid {process_id}, acquired {acquired_at})")]
    Locked {
        lane_id: String,
        step_id: String,
        attempt: u32,
        process_id: u32,
        acquired_at: String,
    },
    #[error("no healthy target for {target} (reroute policy fail_fast)")]
    NoHealthyTarget { target: String },
    #[error("lane io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LaneError + '_ {
    move |source| LaneError::Io { path: path.to_path_buf(), source }
}

/// Settings the coordinator reads from the runner config.
#[derive(Debug, Clone)]
pub struct LaneSettings {
    pub active_target: String,
    pub enabled_targets: Vec<String>,
    pub lane_lock_stale_s: u64,
    pub reroute_policy: ReroutePolicy,
}

impl From<&RunnerConfig> for LaneSettings {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            active_target: config.active_target.clone(),
            enabled_targets: config.enabled_targets.clone(),
            lane_lock_stale_s: config.lane_lock_stale_s,
            reroute_policy: config.reroute_policy,
        }
    }
}

/// Directory layout of one lane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneDirs {
    pub root: PathBuf,
    pub worktree: PathBuf,
    pub artifacts: PathBuf,
    pub status: PathBuf,
    pub lock: PathBuf,
    pub manifest: PathBuf,
}

impl LaneDirs {
    fn new(job_dir: &Path, lane_id: &str) -> Self {
        let root = job_dir.join(LANES_DIR).join(lane_id);
        Self {
            worktree: root.join("worktree"),
            artifacts: root.join("artifacts"),
            status: root.join(STATUS_FILE),
            lock: root.join(LOCK_FILE),
            manifest: root.join(MANIFEST_FILE),
            root,
        }
    }
}

/// What initialization set up, for the caller to log.
#[derive(Debug, Clone, Serialize)]
pub struct LaneInitContext {
    pub lane_roots: IndexMap<String, PathBuf>,
    pub summary_path: PathBuf,
    pub step_lanes: IndexMap<String, String>,
    pub health: HealthSummary,
}

struct LaneRuntime {
    spec: LaneSpec,
    dirs: LaneDirs,
    status: Mutex<LaneStatus>,
    held_lock: Mutex<Option<LaneLock>>,
}

/// Run-level values recorded in the lane summary.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: JobState,
    pub started_at: String,
    pub dispatch: DispatchPlan,
}

#[derive(Debug, Serialize)]
struct LaneSummary<'a> {
    run_id: &'a str,
    state: JobState,
    started_at: &'a str,
    finished_at: String,
    duration_s: f64,
    execution_mode: relay_core::ExecutionMode,
    dispatch_mode: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    policy: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback_reason: Option<&'a str>,
    health: &'a HealthSummary,
    lanes: Vec<LaneStatus>,
}

pub struct LaneCoordinator<C: Clock> {
    job_dir: PathBuf,
    run_id: String,
    settings: LaneSettings,
    lanes: IndexMap<String, LaneRuntime>,
    step_lanes: IndexMap<String, String>,
    health: HealthSummary,
    clock: C,
}

impl<C: Clock> LaneCoordinator<C> {
    /// Build the lane topology for a run and create its on-disk layout.
    ///
    /// Lane ids are deduplicated, a step listed by several lanes stays with
    /// the first, steps unknown to the plan are dropped, and steps no lane
    /// lists are appended to the primary (first) lane. An empty lane list becomes one
    /// default lane.
    pub fn init(
        job_dir: &Path,
        run_id: &str,
        dispatch: &DispatchPlan,
        step_ids: &[String],
        settings: LaneSettings,
        health: HealthSummary,
        clock: C,
    ) -> Result<(Self, LaneInitContext), LaneError> {
        let specs = normalize_lanes(&dispatch.lanes, step_ids);
        let now = format_rfc3339(clock.now());

        let mut lanes = IndexMap::new();
        let mut step_lanes = IndexMap::new();
        for spec in specs {
            let dirs = LaneDirs::new(job_dir, &spec.id);
            for dir in [&dirs.worktree, &dirs.artifacts] {
                std::fs::create_dir_all(dir).map_err(io_err(dir))?;
            }
            let manifest = LaneManifest {
                lane_id: spec.id.clone(),
                target: spec.target.clone(),
                step_ids: spec.step_ids.clone(),
                root: dirs.root.clone(),
                worktree: dirs.worktree.clone(),
                artifacts: dirs.artifacts.clone(),
                run_id: run_id.to_string(),
                created_at: now.clone(),
            };
            persist::write_json(&dirs.manifest, &manifest).map_err(io_err(&dirs.manifest))?;

            let status = LaneStatus {
                lane_id: spec.id.clone(),
                target: spec.target.clone(),
                state: LaneRunState::Idle,
                metrics: LaneMetrics {
                    steps_total: u32::try_from(spec.step_ids.len()).unwrap_or(u32::MAX),
                    ..LaneMetrics::default()
                },
                updated_at: now.clone(),
                ..LaneStatus::default()
            };
            persist::write_json(&dirs.status, &status).map_err(io_err(&dirs.status))?;

            for step_id in &spec.step_ids {
                step_lanes.insert(step_id.clone(), spec.id.clone());
            }
            lanes.insert(
                spec.id.clone(),
                LaneRuntime { spec, dirs, status: Mutex::new(status), held_lock: Mutex::new(None) },
            );
        }

        let context = LaneInitContext {
            lane_roots: lanes.iter().map(|(id, lane)| (id.clone(), lane.dirs.root.clone())).collect(),
            summary_path: job_dir.join(LANE_SUMMARY_FILE),
            step_lanes: step_lanes.clone(),
            health: health.clone(),
        };
        let coordinator = Self {
            job_dir: job_dir.to_path_buf(),
            run_id: run_id.to_string(),
            settings,
            lanes,
            step_lanes,
            health,
            clock,
        };
        Ok((coordinator, context))
    }

    /// Like [`Self::init`], loading the health snapshot from config.
    pub fn init_from_config(
        job_dir: &Path,
        run_id: &str,
        dispatch: &DispatchPlan,
        step_ids: &[String],
        config: &RunnerConfig,
        clock: C,
    ) -> Result<(Self, LaneInitContext), LaneError> {
        let health = load_health_snapshot(&config.health, &clock);
        Self::init(job_dir, run_id, dispatch, step_ids, config.into(), health, clock)
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    pub fn health(&self) -> &HealthSummary {
        &self.health
    }

    pub fn lane_ids(&self) -> impl Iterator<Item = &str> {
        self.lanes.keys().map(String::as_str)
    }

    /// Authoritative lane of a step.
    pub fn lane_for_step(&self, step_id: &str) -> &str {
        self.step_lanes
            .get(step_id)
            .map(String::as_str)
            .or_else(|| self.lanes.keys().next().map(String::as_str))
            .unwrap_or(DEFAULT_LANE_ID)
    }

    pub fn lane_steps(&self, lane_id: &str) -> Option<&[String]> {
        self.lanes.get(lane_id).map(|l| l.spec.step_ids.as_slice())
    }

    pub fn lane_dirs(&self, lane_id: &str) -> Option<&LaneDirs> {
        self.lanes.get(lane_id).map(|l| &l.dirs)
    }

    pub fn lane_status(&self, lane_id: &str) -> Option<LaneStatus> {
        self.lanes.get(lane_id).map(|l| l.status.lock().clone())
    }

    fn lane(&self, lane_id: &str) -> Result<&LaneRuntime, LaneError> {
        self.lanes.get(lane_id).ok_or_else(|| LaneError::UnknownLane(lane_id.to_string()))
    }

    /// Pick the target an attempt runs against, rerouting away from an
    /// unhealthy target when a usable health snapshot says so.
    pub fn resolve_target(
        &self,
        step_target: Option<&str>,
        lane_id: &str,
    ) -> Result<RouteDecision, LaneError> {
        let lane_target = self.lanes.get(lane_id).and_then(|l| l.spec.routable_target());
        let health = self.health.usable.then_some(&self.health);
        let decision = routing::resolve(
            step_target,
            lane_target,
            &self.settings.active_target,
            &self.settings.enabled_targets,
            health,
        );
        if decision.unresolved_unhealthy && self.settings.reroute_policy == ReroutePolicy::FailFast {
            return Err(LaneError::NoHealthyTarget { target: decision.target });
        }
        Ok(decision)
    }

    /// Take the lane lock for an attempt, reclaiming a stale one.
    ///
    /// A missing lock is created exclusively, so of two processes racing for a
    /// free lane only one wins. Reclaiming a stale or unreadable lock
    /// overwrites it and is not exclusive.
    pub fn acquire_lock(&self, lane_id: &str, step_id: &str, attempt: u32) -> Result<LaneLock, LaneError> {
        let lane = self.lane(lane_id)?;
        let now = self.clock.now();
        let path = &lane.dirs.lock;
        let reclaim = match persist::read_json::<LaneLock>(path) {
            Ok(Some(existing)) if !existing.is_stale(now, self.settings.lane_lock_stale_s) => {
                return Err(locked(lane_id, existing));
            }
            Ok(Some(existing)) => {
                tracing::warn!(
                    lane_id,
                    stale_step = %existing.step_id,
                    acquired_at = %existing.acquired_at,
                    "reclaiming stale lane lock"
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(lane_id, error = %e, "unreadable lane lock, reclaiming");
                true
            }
        };

        let lock = LaneLock {
            lane_id: lane_id.to_string(),
            step_id: step_id.to_string(),
            attempt,
            process_id: std::process::id(),
            acquired_at: format_rfc3339(now),
        };
        let written =
            if reclaim { persist::write_json(path, &lock) } else { persist::create_json(path, &lock) };
        match written {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return match persist::read_json::<LaneLock>(path) {
                    Ok(Some(winner)) => Err(locked(lane_id, winner)),
                    _ => Err(io_err(path)(e)),
                };
            }
            Err(e) => return Err(io_err(path)(e)),
        }
        *lane.held_lock.lock() = Some(lock.clone());
        Ok(lock)
    }

    /// Release the lane lock if it is held by `step_id`/`attempt` in this process.
    pub fn release_lock(&self, lane_id: &str, step_id: &str, attempt: u32) {
        let Ok(lane) = self.lane(lane_id) else { return };
        let mut held = lane.held_lock.lock();
        let ours = held.as_ref().is_some_and(|l| l.step_id == step_id && l.attempt == attempt);
        if ours {
            *held = None;
            remove_lock_file(&lane.dirs.lock);
        }
    }

    /// Record the start of an attempt. Takes the lane lock.
    pub fn start_step_attempt(
        &self,
        lane_id: &str,
        step_id: &str,
        attempt: u32,
        target: &str,
        reroute_reason: Option<&str>,
    ) -> Result<(), LaneError> {
        self.acquire_lock(lane_id, step_id, attempt)?;
        self.update_lane(lane_id, |status| {
            status.state = LaneRunState::Running;
            status.current_step = Some(step_id.to_string());
            status.current_attempt = Some(attempt);
            status.target = Some(target.to_string());
            status.metrics.attempts_total += 1;
            if attempt > 1 {
                status.metrics.retries_total += 1;
            }
            if reroute_reason.is_some() {
                status.metrics.reroutes_total += 1;
            }
        })
    }

    /// Record the end of an attempt and release its lock. Safe to call even if
    /// the start failed.
    pub fn finish_step_attempt(
        &self,
        lane_id: &str,
        step_id: &str,
        attempt: u32,
        success: bool,
        duration_s: f64,
        error: Option<&str>,
    ) -> Result<(), LaneError> {
        self.release_lock(lane_id, step_id, attempt);
        self.update_lane(lane_id, |status| {
            status.metrics.duration_s += duration_s.max(0.0);
            status.current_attempt = None;
            if success {
                status.metrics.steps_completed += 1;
                status.last_error = None;
                status.current_step = None;
                status.state = if status.metrics.steps_completed >= status.metrics.steps_total {
                    LaneRunState::Completed
                } else {
                    LaneRunState::Idle
                };
            } else {
                status.metrics.failed_attempts += 1;
                status.last_error = error.map(str::to_string);
                status.state = LaneRunState::Degraded;
            }
        })
    }

    /// Count a step that an earlier run already completed.
    pub fn note_step_already_completed(&self, lane_id: &str) -> Result<(), LaneError> {
        self.update_lane(lane_id, |status| {
            status.metrics.steps_completed += 1;
            if status.metrics.steps_completed >= status.metrics.steps_total {
                status.state = LaneRunState::Completed;
            }
        })
    }

    fn update_lane(&self, lane_id: &str, f: impl FnOnce(&mut LaneStatus)) -> Result<(), LaneError> {
        let lane = self.lane(lane_id)?;
        let mut status = lane.status.lock();
        f(&mut status);
        status.updated_at = format_rfc3339(self.clock.now());
        persist::write_json(&lane.dirs.status, &*status).map_err(io_err(&lane.dirs.status))
    }

    /// Release leftover locks, settle lane states against the run outcome and
    /// write `lane_summary.json`. Returns the summary path.
    pub fn finalize_run(&self, outcome: &RunOutcome) -> Result<PathBuf, LaneError> {
        let now = self.clock.now();
        let mut lanes = Vec::with_capacity(self.lanes.len());
        for (lane_id, lane) in &self.lanes {
            if lane.held_lock.lock().take().is_some() {
                remove_lock_file(&lane.dirs.lock);
            }
            let success = outcome.state == JobState::Completed;
            self.update_lane(lane_id, |status| {
                status.state = match (success, status.state) {
                    (true, LaneRunState::Idle | LaneRunState::Running) => LaneRunState::Completed,
                    (false, LaneRunState::Running) => LaneRunState::Degraded,
                    (_, state) => state,
                };
                status.current_attempt = None;
            })?;
            lanes.push(lane.status.lock().clone());
        }

        let duration_s = relay_core::time_fmt::parse_timestamp(&outcome.started_at)
            .map(|start| seconds_between(start, now).max(0.0))
            .unwrap_or(0.0);
        let summary = LaneSummary {
            run_id: &self.run_id,
            state: outcome.state,
            started_at: &outcome.started_at,
            finished_at: format_rfc3339(now),
            duration_s,
            execution_mode: outcome.dispatch.execution_mode,
            dispatch_mode: &outcome.dispatch.dispatch_mode,
            policy: &outcome.dispatch.policy,
            fallback_reason: outcome.dispatch.fallback_reason.as_deref(),
            health: &self.health,
            lanes,
        };
        let path = self.job_dir.join(LANE_SUMMARY_FILE);
        persist::write_json(&path, &summary).map_err(io_err(&path))?;
        Ok(path)
    }
}

fn locked(lane_id: &str, holder: LaneLock) -> LaneError {
    LaneError::Locked {
        lane_id: lane_id.to_string(),
        step_id: holder.step_id,
        attempt: holder.attempt,
        process_id: holder.process_id,
        acquired_at: holder.acquired_at,
    }
}

fn remove_lock_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove lane lock");
        }
    }
}

/// Dedupe lanes and step membership, then attach unassigned steps to the primary lane.
fn normalize_lanes(raw: &[LaneSpec], step_ids: &[String]) -> Vec<LaneSpec> {
    let mut lanes: Vec<LaneSpec> = Vec::new();
    let mut owner: HashMap<&str, usize> = HashMap::new();
    let known: std::collections::HashSet<&str> = step_ids.iter().map(String::as_str).collect();

    for spec in raw {
        let id = spec.id.trim();
        let id = if id.is_empty() { format!("lane_{}", lanes.len() + 1) } else { id.to_string() };
        let index = match lanes.iter().position(|l| l.id == id) {
            Some(index) => index,
            None => {
                lanes.push(LaneSpec { id, target: spec.target.clone(), step_ids: Vec::new() });
                lanes.len() - 1
            }
        };
        for step_id in &spec.step_ids {
            if !known.contains(step_id.as_str()) || owner.contains_key(step_id.as_str()) {
                continue;
            }
            owner.insert(step_id.as_str(), index);
            lanes[index].step_ids.push(step_id.clone());
        }
    }

    if lanes.is_empty() {
        lanes.push(LaneSpec {
            id: DEFAULT_LANE_ID.to_string(),
            target: Some(SINGLE_LANE_TARGET.to_string()),
            step_ids: Vec::new(),
        });
    }
    let unassigned: Vec<String> =
        step_ids.iter().filter(|id| !owner.contains_key(id.as_str())).cloned().collect();
    lanes[0].step_ids.extend(unassigned);
    lanes
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
