// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciling a previous run's step states before executing again.

use relay_adapters::StepValidator;
use relay_core::{JobStatus, Plan, StepRunState};
use std::path::Path;

pub(crate) const RESUME_VERIFY_FAILED: &str =
    "completed in a previous run but output verification failed; rerunning";

/// Apply resume rules to every plan step. Returns one note per changed step.
///
/// - `completed` steps are re-verified; a failed check resets them to
///   `pending` with zero attempts.
/// - `failed` steps get a fresh attempt budget.
/// - `running` steps (interrupted mid-attempt) return to `pending` and keep
///   their attempt count.
pub(crate) async fn apply_resume_policy(
    status: &mut JobStatus,
    plan: &Plan,
    job_dir: &Path,
    validator: &dyn StepValidator,
    now: &str,
) -> Vec<String> {
    let mut notes = Vec::new();
    for step in &plan.steps {
        let state = status.step(&step.id).map(|s| s.state).unwrap_or_default();
        let entry = match state {
            StepRunState::Pending => continue,
            StepRunState::Completed => {
                if validator.validate_step(job_dir, step).await {
                    continue;
                }
                let entry = status.step_mut(&step.id);
                entry.attempts = 0;
                entry.last_error = Some(RESUME_VERIFY_FAILED.to_string());
                notes.push(format!("resume: step {} output failed verification, reset to pending", step.id));
                entry
            }
            StepRunState::Failed => {
                let entry = status.step_mut(&step.id);
                notes.push(format!(
                    "resume: step {} failed previously after {} attempt(s), retrying with a fresh budget",
                    step.id, entry.attempts
                ));
                entry.attempts = 0;
                entry
            }
            StepRunState::Running => {
                let entry = status.step_mut(&step.id);
                notes.push(format!(
                    "resume: step {} was interrupted during attempt {}, reset to pending",
                    step.id, entry.attempts
                ));
                entry
            }
        };
        entry.state = StepRunState::Pending;
        entry.updated_at = now.to_string();
    }
    notes
}
