// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job status document (`status.json`).
//!
//! Rewritten after every step-state transition so a crash leaves a
//! recoverable snapshot for resume.

use crate::dispatch::ExecutionMode;
use crate::health::HealthSummary;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Running,
    Completed,
    Failed,
}

crate::simple_display! {
    JobState {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRunState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

crate::simple_display! {
    StepRunState {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Runtime state of one step, tracked separately from the immutable plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    #[serde(default)]
    pub state: StepRunState,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub lane_id: Option<String>,
    /// Target used by the latest attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reroute_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub state: JobState,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub current_lane: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_lane: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub dispatch_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthSummary>,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Per-step state in plan order.
    #[serde(default)]
    pub steps: IndexMap<String, StepState>,
}

impl JobStatus {
    /// Align `steps` with the plan: keep known entries in plan order, add
    /// pending entries for new steps, drop entries for removed steps.
    pub fn sync_steps(&mut self, step_ids: &[String]) {
        let mut previous = std::mem::take(&mut self.steps);
        for id in step_ids {
            let entry = previous.shift_remove(id).unwrap_or_default();
            self.steps.insert(id.clone(), entry);
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&StepState> {
        self.steps.get(step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> &mut StepState {
        self.steps.entry(step_id.to_string()).or_default()
    }

    pub fn attempts(&self, step_id: &str) -> u32 {
        self.step(step_id).map(|s| s.attempts).unwrap_or(0)
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.step(step_id).is_some_and(|s| s.state == StepRunState::Completed)
    }

    /// Record the first failure only; later failures keep the original pair.
    pub fn record_failure(&mut self, step_id: &str, lane_id: &str, error: &str) -> bool {
        if self.failed_step.is_some() {
            return false;
        }
        self.failed_step = Some(step_id.to_string());
        self.failed_lane = Some(lane_id.to_string());
        self.error = Some(error.to_string());
        true
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
