// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner configuration, loaded from TOML.

use crate::env;
use relay_core::WorkerSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Per-job config file looked up in the job directory.
pub const JOB_CONFIG_FILE: &str = "relay.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What to do when a step's target is unhealthy and no healthy fallback exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReroutePolicy {
    /// Keep the unhealthy target and carry on.
    #[default]
    BestEffort,
    /// Fail the attempt.
    FailFast,
}

relay_core::simple_display! {
    ReroutePolicy {
        BestEffort => "best_effort",
        FailFast => "fail_fast",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Defaults to `<state_dir>/target_health.json`.
    pub snapshot_path: Option<PathBuf>,
    pub max_age_s: u64,
    pub enabled: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { snapshot_path: None, max_age_s: 120, enabled: true }
    }
}

impl HealthConfig {
    pub fn resolved_snapshot_path(&self) -> Option<PathBuf> {
        self.snapshot_path
            .clone()
            .or_else(|| env::state_dir().map(|dir| dir.join("target_health.json")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub timeout_s: f64,
    pub poll_interval_s: f64,
    pub command_timeout_s: Option<f64>,
    pub shell: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { timeout_s: 600.0, poll_interval_s: 1.0, command_timeout_s: None, shell: "sh".into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub send_text_command: Option<String>,
    pub send_image_command: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanBuilderConfig {
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Emit one lane per target instead of a single sequential lane.
    pub parallel: bool,
}

/// Everything the runner reads from `relay.toml` / `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub active_target: String,
    pub enabled_targets: Vec<String>,
    pub max_lanes: usize,
    pub lane_lock_stale_s: u64,
    pub completion_timeout_s: f64,
    pub default_wait_s: f64,
    pub reroute_policy: ReroutePolicy,
    pub project_name: Option<String>,
    pub health: HealthConfig,
    pub worker: WorkerConfig,
    /// Named adapter defaults for worker_contract steps.
    pub adapters: BTreeMap<String, WorkerSpec>,
    pub sequencer: SequencerConfig,
    pub plan_builder: PlanBuilderConfig,
    pub dispatch: DispatchConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            active_target: "default".into(),
            enabled_targets: Vec::new(),
            max_lanes: 4,
            lane_lock_stale_s: 300,
            completion_timeout_s: 180.0,
            default_wait_s: 0.0,
            reroute_policy: ReroutePolicy::default(),
            project_name: None,
            health: HealthConfig::default(),
            worker: WorkerConfig::default(),
            adapters: BTreeMap::new(),
            sequencer: SequencerConfig::default(),
            plan_builder: PlanBuilderConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: RunnerConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw, path)
    }

    /// Load config for a job.
    ///
    /// Resolution: `explicit` > `RELAY_CONFIG` > `<job_dir>/relay.toml` >
    /// `<state_dir>/config.toml` > defaults. An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>, job_dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit.map(Path::to_path_buf).or_else(env::config_override) {
            tracing::debug!(path = %path.display(), "loading config");
            return Self::from_file(&path);
        }
        let candidates = [
            Some(job_dir.join(JOB_CONFIG_FILE)),
            env::state_dir().map(|dir| dir.join("config.toml")),
        ];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                tracing::debug!(path = %path.display(), "loading config");
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.max_lanes == 0 {
            return Err(ConfigError::Invalid("max_lanes must be at least 1".into()));
        }
        if self.worker.poll_interval_s.is_nan() || self.worker.poll_interval_s <= 0.0 {
            return Err(ConfigError::Invalid("worker.poll_interval_s must be positive".into()));
        }
        if self.worker.timeout_s.is_nan() || self.worker.timeout_s < 0.0 {
            return Err(ConfigError::Invalid("worker.timeout_s must not be negative".into()));
        }
        Ok(())
    }

    /// Project name passed to the plan builder; defaults to the job directory name.
    pub fn project_name_for(&self, job_dir: &Path) -> String {
        self.project_name.clone().unwrap_or_else(|| {
            job_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "relay".into())
        })
    }

    pub fn completion_timeout(&self) -> Duration {
        secs(self.completion_timeout_s)
    }
}

/// Duration from fractional seconds, clamping negatives and NaN to zero and
/// values past `Duration::MAX` to `Duration::MAX`.
pub(crate) fn secs(value: f64) -> Duration {
    if value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
