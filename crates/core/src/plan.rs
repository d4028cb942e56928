// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan and step definitions.
//!
//! A plan is the ordered list of steps persisted in `plan.json`, plus the
//! dispatch plan computed for the current run. Step types are a closed sum
//! type: an unknown `type` fails at load time rather than at dispatch time.

use crate::dispatch::DispatchPlan;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Retries allowed when a step does not declare `max_retries`.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Errors raised while loading or normalizing a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid plan document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("plan has no steps")]
    EmptySteps,
    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),
    #[error("step {step_id}: {message}")]
    InvalidStep { step_id: String, message: String },
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_press_enter() -> bool {
    true
}

/// Type-specific step payload, tagged by the `type` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Paste text into the target surface.
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt_file: Option<String>,
    },
    /// Paste an image into the target surface.
    Image { image_path: String },
    /// Output check only; nothing is sent.
    Validate,
    /// Delegate to an out-of-process adapter via request/response documents.
    WorkerContract {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker: Option<WorkerSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker_contract: Option<WorkerSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt_file: Option<String>,
    },
}

impl StepKind {
    /// The `type` string this kind serializes as.
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::Text { .. } => "text",
            StepKind::Image { .. } => "image",
            StepKind::Validate => "validate",
            StepKind::WorkerContract { .. } => "worker_contract",
        }
    }
}

/// One unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub id: String,
    /// Logical automation target; falls back to the lane or global target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Post-send delay in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<f64>,
    #[serde(default = "default_press_enter")]
    pub press_enter: bool,
    /// Job-relative path the step's result is materialized to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureOptions>,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Total attempts this step may make (`max_retries + 1`).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Post-send delay, falling back to `default_s` when unset or negative.
    pub fn wait_s(&self, default_s: f64) -> f64 {
        match self.wait {
            Some(w) if w.is_finite() && w >= 0.0 => w,
            _ => default_s.max(0.0),
        }
    }

    /// Target declared on the step itself, ignoring blanks.
    pub fn declared_target(&self) -> Option<&str> {
        self.target.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Inline worker spec: `worker` layered over `worker_contract`.
    pub fn inline_worker(&self) -> Option<WorkerSpec> {
        match &self.kind {
            StepKind::WorkerContract { worker, worker_contract, .. } => {
                match (worker, worker_contract) {
                    (Some(w), Some(c)) => Some(w.layered_over(c)),
                    (Some(w), None) => Some(w.clone()),
                    (None, Some(c)) => Some(c.clone()),
                    (None, None) => None,
                }
            }
            _ => None,
        }
    }

    fn check(&self) -> Result<(), PlanError> {
        let invalid = |message: &str| PlanError::InvalidStep {
            step_id: self.id.clone(),
            message: message.to_string(),
        };
        match &self.kind {
            StepKind::Text { content, prompt_file } if content.is_none() && prompt_file.is_none() => {
                Err(invalid("text step needs `content` or `prompt_file`"))
            }
            StepKind::Image { image_path } if image_path.trim().is_empty() => {
                Err(invalid("image step needs a non-empty `image_path`"))
            }
            _ => Ok(()),
        }
    }
}

crate::builder! {
    pub struct StepBuilder => Step {
        into {
            id: String = "step_1",
        }
        set {
            max_retries: u32 = DEFAULT_MAX_RETRIES,
            press_enter: bool = true,
            kind: StepKind = StepKind::Validate,
        }
        option {
            target: String,
            wait: f64,
            output_file: String,
            capture: CaptureOptions,
        }
    }
}

/// Adapter configuration for a `worker_contract` step.
///
/// The same shape is used for named adapter defaults in the runner config;
/// a step's inline spec is layered over the adapter it names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSpec {
    /// Name of the configured adapter supplying defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    /// Delegation mode, e.g. `vscode_chat` for automation delegation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Shell command template with `${var}` placeholders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Text sent on the automation path (overrides step content).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub press_enter: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub command_vars: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureOptions>,
}

/// Automation mode that routes a worker step through the sequencer.
pub const AUTOMATION_MODE: &str = "vscode_chat";

impl WorkerSpec {
    /// Layer `self` over `base`. Values set on `self` win; maps merge key-wise.
    pub fn layered_over(&self, base: &WorkerSpec) -> WorkerSpec {
        let mut env = base.env.clone();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        let mut command_vars = base.command_vars.clone();
        command_vars.extend(self.command_vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        let capture = match (&self.capture, &base.capture) {
            (Some(top), Some(bottom)) => Some(top.layered_over(bottom)),
            (top, bottom) => top.clone().or_else(|| bottom.clone()),
        };
        WorkerSpec {
            adapter: self.adapter.clone().or_else(|| base.adapter.clone()),
            mode: self.mode.clone().or_else(|| base.mode.clone()),
            command: self.command.clone().or_else(|| base.command.clone()),
            prompt: self.prompt.clone().or_else(|| base.prompt.clone()),
            timeout_s: self.timeout_s.or(base.timeout_s),
            poll_interval_s: self.poll_interval_s.or(base.poll_interval_s),
            command_timeout_s: self.command_timeout_s.or(base.command_timeout_s),
            wait: self.wait.or(base.wait),
            press_enter: self.press_enter.or(base.press_enter),
            env,
            command_vars,
            capture,
        }
    }

    /// True when this spec delegates to chat automation rather than (only) a command.
    pub fn is_automation(&self) -> bool {
        let mode_matches = self.mode.as_deref().is_some_and(|m| m.eq_ignore_ascii_case(AUTOMATION_MODE));
        let adapter_matches = self
            .adapter
            .as_deref()
            .is_some_and(|a| a.to_ascii_lowercase().contains("chat"));
        mode_matches || adapter_matches
    }

    pub fn has_command(&self) -> bool {
        self.command.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// Output-capture options for a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_s: Option<f64>,
    /// Require the captured content to differ from the pre-send baseline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_fresh: Option<bool>,
    /// Continue with capture-only completion when sending fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
    /// Options understood only by the capture runtime.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CaptureOptions {
    pub fn layered_over(&self, base: &CaptureOptions) -> CaptureOptions {
        let mut extra = base.extra.clone();
        extra.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        CaptureOptions {
            enabled: self.enabled.or(base.enabled),
            timeout_s: self.timeout_s.or(base.timeout_s),
            require_fresh: self.require_fresh.or(base.require_fresh),
            fallback: self.fallback.or(base.fallback),
            extra,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// The persisted plan document (`plan.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_plan: Option<DispatchPlan>,
    /// Author metadata preserved across rewrites.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Plan {
    /// Parse a plan document: either `{ "steps": [...] }` or a bare step array.
    ///
    /// Ids are canonicalized and the step list is validated.
    pub fn from_json(raw: &str) -> Result<Plan, PlanError> {
        let value: Value = serde_json::from_str(raw)?;
        let mut plan = match value {
            Value::Array(_) => Plan {
                steps: serde_json::from_value(value)?,
                ..Plan::default()
            },
            other => serde_json::from_value(other)?,
        };
        plan.assign_ids();
        plan.validate()?;
        Ok(plan)
    }

    /// Give every step without an id the canonical `step_<ordinal>` id (1-based).
    ///
    /// When a step already carries that id explicitly, the generated id gets a
    /// `_<n>` suffix instead, so generated ids never collide.
    pub fn assign_ids(&mut self) {
        for step in &mut self.steps {
            let trimmed = step.id.trim();
            if trimmed.len() != step.id.len() {
                step.id = trimmed.to_string();
            }
        }
        let mut taken: HashSet<String> = self.steps.iter().map(|s| s.id.clone()).collect();
        for (idx, step) in self.steps.iter_mut().enumerate() {
            if !step.id.is_empty() {
                continue;
            }
            let base = format!("step_{}", idx + 1);
            let mut id = base.clone();
            let mut n = 2;
            while taken.contains(&id) {
                id = format!("{base}_{n}");
                n += 1;
            }
            taken.insert(id.clone());
            step.id = id;
        }
    }

    /// Check the plan invariants: non-empty, unique ids, well-formed steps.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::EmptySteps);
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(PlanError::DuplicateStepId(step.id.clone()));
            }
            step.check()?;
        }
        Ok(())
    }

    pub fn step_ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
