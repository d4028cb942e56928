// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job Runner.
//!
//! Drives one job from a persisted or freshly built plan to a terminal state.
//! Startup loads the plan, applies scheduler targets, computes the dispatch
//! plan and reconciles the previous run's status; execution then runs either
//! the sequential executor or the parallel lane executor.

mod attempt;
mod parallel;
mod resume;
mod sequential;
mod startup;
mod status_store;

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::job_logger::JobLogger;
use crate::lanes::{LaneCoordinator, RunOutcome};
use crate::worker_contract::WorkerContractRuntime;
use relay_adapters::{
    ActiveTargetScheduler, CaptureRuntime, CommandPlanBuilder, CommandSequencer, LaneDispatcher,
    NoopCapture, OutputFileValidator, PlanBuilder, Sequencer, StepValidator, TargetPartitionDispatcher,
    TargetScheduler,
};
use relay_core::{Clock, DispatchPlan, ExecutionMode, JobState, Plan, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use startup::PLAN_FILE;
pub use status_store::STATUS_FILE;

/// External services the runner delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub plan_builder: Arc<dyn PlanBuilder>,
    pub scheduler: Arc<dyn TargetScheduler>,
    pub dispatcher: Arc<dyn LaneDispatcher>,
    pub validator: Arc<dyn StepValidator>,
    pub capture: Arc<dyn CaptureRuntime>,
    pub sequencer: Arc<dyn Sequencer>,
}

impl Collaborators {
    /// Built-in implementations driven by config.
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            plan_builder: Arc::new(CommandPlanBuilder::new(
                config.plan_builder.command.clone(),
                config.worker.shell.clone(),
            )),
            scheduler: Arc::new(ActiveTargetScheduler::new(config.active_target.clone())),
            dispatcher: Arc::new(TargetPartitionDispatcher::new(
                config.dispatch.parallel,
                config.max_lanes,
            )),
            validator: Arc::new(OutputFileValidator),
            capture: Arc::new(NoopCapture),
            sequencer: Arc::new(CommandSequencer::new(
                config.sequencer.send_text_command.clone(),
                config.sequencer.send_image_command.clone(),
                config.worker.shell.clone(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Rebuild `plan.json` from the brief even if it exists.
    pub force_plan: bool,
}

pub struct JobRunner<C: Clock = SystemClock> {
    config: Arc<RunnerConfig>,
    collab: Collaborators,
    clock: C,
}

impl JobRunner<SystemClock> {
    pub fn new(config: RunnerConfig) -> Self {
        let collab = Collaborators::from_config(&config);
        Self::with_collaborators(config, collab, SystemClock)
    }
}

impl<C: Clock> JobRunner<C> {
    pub fn with_collaborators(config: RunnerConfig, collab: Collaborators, clock: C) -> Self {
        Self { config: Arc::new(config), collab, clock }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run the job in `job_dir`.
    ///
    /// Returns `Ok(true)` when every step completed and `Ok(false)` when a
    /// step exhausted its attempts. `Err` means the run could not start.
    pub async fn run_job(&self, job_dir: &Path, options: &RunOptions) -> Result<bool, RunnerError> {
        let logger = JobLogger::new(job_dir, self.clock.clone());
        let ctx = match self.prepare(job_dir, options, &logger).await {
            Ok(ctx) => Arc::new(ctx),
            Err(e) => {
                if job_dir.is_dir() {
                    logger.append(&format!("startup failed: {e}"));
                }
                tracing::error!(job_dir = %job_dir.display(), error = %e, "run could not start");
                return Err(e);
            }
        };

        let success = match ctx.dispatch.execution_mode {
            ExecutionMode::ParallelLanes => ctx.run_parallel().await,
            ExecutionMode::SingleLane => ctx.run_sequential().await,
        };
        ctx.finish(success);
        Ok(success)
    }
}

/// Everything one run shares between its lanes.
pub(crate) struct RunContext<C: Clock> {
    job_dir: PathBuf,
    plan: Plan,
    dispatch: DispatchPlan,
    config: Arc<RunnerConfig>,
    collab: Collaborators,
    worker: WorkerContractRuntime<C>,
    lanes: LaneCoordinator<C>,
    status: status_store::StatusStore<C>,
    logger: JobLogger<C>,
    started_at: String,
}

impl<C: Clock> RunContext<C> {
    fn log(&self, message: &str) {
        self.logger.append(message);
    }

    fn finish(&self, success: bool) {
        let state = if success { JobState::Completed } else { JobState::Failed };
        let finished_at = self.status.now();
        let status = self.status.update(|status| {
            status.state = state;
            status.finished_at = Some(finished_at);
            if success {
                status.current_step = None;
                status.current_lane = None;
            }
            status.clone()
        });

        let outcome =
            RunOutcome { state, started_at: self.started_at.clone(), dispatch: self.dispatch.clone() };
        match self.lanes.finalize_run(&outcome) {
            Ok(path) => tracing::debug!(path = %path.display(), "lane summary written"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to finalize lanes");
                self.log(&format!("warning: lane finalization failed: {e}"));
            }
        }

        if success {
            self.log(&format!("job completed: {} step(s)", status.steps.len()));
        } else {
            self.log(&format!(
                "job failed at step {} (lane {}): {}",
                status.failed_step.as_deref().unwrap_or("?"),
                status.failed_lane.as_deref().unwrap_or("?"),
                status.error.as_deref().unwrap_or("unknown error"),
            ));
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
