// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parallel multi-lane executor.
//!
//! One task per lane with queued steps, bounded by a semaphore sized to
//! `min(max_lanes, active lanes)`. The first lane to exhaust a step's attempts
//! cancels a shared token; other lanes finish their in-flight attempt and stop
//! at the next step or attempt boundary.

use super::attempt::StepOutcome;
use super::RunContext;
use indexmap::IndexMap;
use relay_core::{Clock, StepRunState};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

impl<C: Clock> RunContext<C> {
    /// Lane a step runs on: explicit dispatch-plan membership, else the coordinator's mapping.
    fn assigned_lane(&self, step_id: &str) -> String {
        self.dispatch
            .lane_of(step_id)
            .filter(|lane_id| self.lanes.lane_steps(lane_id).is_some())
            .unwrap_or_else(|| self.lanes.lane_for_step(step_id))
            .to_string()
    }

    /// Queued (not yet completed) steps grouped by lane, in lane order.
    fn lane_queues(&self) -> IndexMap<String, Vec<String>> {
        let mut queues: IndexMap<String, Vec<String>> = IndexMap::new();
        for lane_id in self.lanes.lane_ids() {
            for step_id in self.lanes.lane_steps(lane_id).unwrap_or_default() {
                if self.status.is_completed(step_id) {
                    if let Err(e) = self.lanes.note_step_already_completed(lane_id) {
                        tracing::warn!(lane_id, error = %e, "failed to update lane status");
                    }
                    continue;
                }
                queues.entry(self.assigned_lane(step_id)).or_default().push(step_id.clone());
            }
        }
        queues
    }

    pub(crate) async fn run_parallel(self: &Arc<Self>) -> bool {
        let queues = self.lane_queues();
        if queues.is_empty() {
            self.log("all steps already completed");
            return true;
        }
        let pool = self.config.max_lanes.min(queues.len()).max(1);
        self.log(&format!("executing {} lane(s) in parallel, pool size {pool}", queues.len()));

        let semaphore = Arc::new(Semaphore::new(pool));
        let stop = CancellationToken::new();
        let mut tasks = JoinSet::new();
        for (lane_id, step_ids) in queues {
            let ctx = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let stop = stop.clone();
            let (lane, steps) = (lane_id.clone(), step_ids.clone());
            let lane_task = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                ctx.run_lane(&lane, &steps, &stop).await;
            });
            // Pair the lane task's result with its lane so a panic is attributed to it.
            tasks.spawn(async move { (lane_id, step_ids, lane_task.await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((lane_id, step_ids, Err(e))) => {
                    self.record_lane_abort(&lane_id, &step_ids, &e.to_string());
                    stop.cancel();
                }
                Ok((_, _, Ok(()))) => {}
                Err(e) => tracing::error!(error = %e, "lane wrapper task failed"),
            }
        }
        self.status.snapshot().failed_step.is_none()
    }

    /// Fail the step a crashed lane was working on: its in-flight step, else
    /// the first of its steps still queued.
    fn record_lane_abort(&self, lane_id: &str, step_ids: &[String], cause: &str) {
        let error = format!("lane task aborted: {cause}");
        tracing::error!(lane_id, error = %cause, "lane task aborted");
        let step_id = self
            .lanes
            .lane_status(lane_id)
            .and_then(|lane| lane.current_step)
            .or_else(|| step_ids.iter().find(|id| !self.status.is_completed(id)).cloned())
            .unwrap_or_default();
        if !step_id.is_empty() {
            self.status.update_step(&step_id, |entry| {
                entry.state = StepRunState::Failed;
                entry.last_error = Some(error.clone());
            });
        }
        self.status.update(|status| status.record_failure(&step_id, lane_id, &error));
        self.log(&format!("lane {lane_id} aborted at step {step_id}: {cause}"));
    }

    async fn run_lane(&self, lane_id: &str, step_ids: &[String], stop: &CancellationToken) {
        for step_id in step_ids {
            if stop.is_cancelled() {
                self.log(&format!("lane {lane_id} stopping: another lane failed"));
                return;
            }
            let Some(step) = self.plan.step(step_id) else {
                continue;
            };
            self.log_eta(std::slice::from_ref(step));
            match self.run_step(step, lane_id, Some(stop)).await {
                StepOutcome::Completed => {}
                StepOutcome::Stopped => return,
                StepOutcome::Failed(error) => {
                    let first = self
                        .status
                        .update(|status| status.record_failure(step_id, lane_id, &error));
                    if first {
                        self.log(&format!("lane {lane_id} failed at step {step_id}, stopping other lanes"));
                    }
                    stop.cancel();
                    return;
                }
            }
        }
    }
}
