// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch plan: lane topology and execution mode for one run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lane target meaning "no lane-specific target".
pub const SINGLE_LANE_TARGET: &str = "single_lane";

/// Id of the lane synthesized when a dispatch plan lists none.
pub const DEFAULT_LANE_ID: &str = "lane_1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    SingleLane,
    ParallelLanes,
}

crate::simple_display! {
    ExecutionMode {
        SingleLane => "single_lane",
        ParallelLanes => "parallel_lanes",
    }
}

/// One lane as listed by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub step_ids: Vec<String>,
}

impl LaneSpec {
    /// Lane target unless blank or the single-lane sentinel.
    pub fn routable_target(&self) -> Option<&str> {
        self.target
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != SINGLE_LANE_TARGET)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchPlan {
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub dispatch_mode: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub policy: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default)]
    pub lanes: Vec<LaneSpec>,
}

impl DispatchPlan {
    /// A sequential plan with every step on one default lane.
    pub fn single_lane(step_ids: &[String]) -> Self {
        Self {
            execution_mode: ExecutionMode::SingleLane,
            dispatch_mode: "single_lane".to_string(),
            policy: Value::Null,
            fallback_reason: None,
            lanes: vec![LaneSpec {
                id: DEFAULT_LANE_ID.to_string(),
                target: Some(SINGLE_LANE_TARGET.to_string()),
                step_ids: step_ids.to_vec(),
            }],
        }
    }

    /// Lane that explicitly lists `step_id`, first match wins.
    pub fn lane_of(&self, step_id: &str) -> Option<&str> {
        self.lanes
            .iter()
            .find(|lane| lane.step_ids.iter().any(|s| s == step_id))
            .map(|lane| lane.id.as_str())
    }

    /// Record a fallback reason, appending to any existing one.
    pub fn push_fallback_reason(&mut self, reason: &str) {
        self.fallback_reason = Some(match self.fallback_reason.take() {
            Some(existing) if !existing.is_empty() => format!("{existing};{reason}"),
            _ => reason.to_string(),
        });
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
