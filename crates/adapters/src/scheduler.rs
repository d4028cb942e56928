// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default target assignment for steps that declare none.

use relay_core::{Step, StepKind};
use serde_json::{json, Value};

/// A target chosen for a step, with the rule that chose it.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetAssignment {
    pub step_id: String,
    pub target: String,
    pub reason: String,
}

impl TargetAssignment {
    pub fn to_json(&self) -> Value {
        json!({ "step_id": self.step_id, "target": self.target, "reason": self.reason })
    }
}

/// Proposes targets for steps that have none. Callers apply the proposals
/// only to steps still lacking a target.
pub trait TargetScheduler: Send + Sync {
    fn assign_missing_targets(&self, steps: &[Step]) -> Vec<TargetAssignment>;
}

/// Assigns the globally active target to every targetless step that sends
/// something. Validate steps stay targetless.
#[derive(Debug, Clone)]
pub struct ActiveTargetScheduler {
    target: String,
}

impl ActiveTargetScheduler {
    pub fn new(target: impl Into<String>) -> Self {
        Self { target: target.into() }
    }
}

impl TargetScheduler for ActiveTargetScheduler {
    fn assign_missing_targets(&self, steps: &[Step]) -> Vec<TargetAssignment> {
        if self.target.trim().is_empty() {
            return Vec::new();
        }
        steps
            .iter()
            .filter(|s| s.declared_target().is_none() && !matches!(s.kind, StepKind::Validate))
            .map(|s| TargetAssignment {
                step_id: s.id.clone(),
                target: self.target.clone(),
                reason: "default_active_target".to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
