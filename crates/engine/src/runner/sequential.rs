// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-lane sequential executor.

use super::attempt::StepOutcome;
use super::RunContext;
use relay_core::Clock;

impl<C: Clock> RunContext<C> {
    /// Run steps in plan order; the first step to exhaust its attempts fails
    /// the job and later steps are never attempted.
    pub(crate) async fn run_sequential(&self) -> bool {
        self.log(&format!("executing {} step(s) sequentially", self.plan.steps.len()));
        for (index, step) in self.plan.steps.iter().enumerate() {
            let lane_id = self.lanes.lane_for_step(&step.id).to_string();
            self.log_eta(&self.plan.steps[index..]);

            if self.status.is_completed(&step.id) {
                self.log(&format!("step {} already completed, skipping", step.id));
                if let Err(e) = self.lanes.note_step_already_completed(&lane_id) {
                    tracing::warn!(lane_id, error = %e, "failed to update lane status");
                }
                continue;
            }

            match self.run_step(step, &lane_id, None).await {
                StepOutcome::Completed => {}
                StepOutcome::Failed(error) => {
                    self.status.update(|status| status.record_failure(&step.id, &lane_id, &error));
                    return false;
                }
                StepOutcome::Stopped => return false,
            }
        }
        true
    }
}
