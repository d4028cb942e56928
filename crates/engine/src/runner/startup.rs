// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run startup: plan, targets, dispatch, resume and lane setup.

use super::resume::apply_resume_policy;
use super::status_store::{load_status, StatusStore};
use super::{JobRunner, RunContext, RunOptions};
use crate::error::RunnerError;
use crate::job_logger::JobLogger;
use crate::lanes::{LaneCoordinator, LaneInitContext};
use crate::persist;
use crate::worker_contract::{WorkerContractRuntime, WorkerSettings};
use relay_adapters::PlanRequest;
use relay_core::{Clock, ExecutionMode, JobState, JobStatus, Plan, StepKind};
use std::path::Path;
use std::sync::Arc;

pub const PLAN_FILE: &str = "plan.json";
const BRIEF_FILES: [&str; 2] = ["brief.md", "brief.txt"];
const DESIGN_FILE: &str = "design.md";

/// Step types the parallel executor runs.
const PARALLEL_STEP_TYPES: [&str; 2] = ["worker_contract", "validate"];

impl<C: Clock> JobRunner<C> {
    pub(super) async fn prepare(
        &self,
        job_dir: &Path,
        options: &RunOptions,
        logger: &JobLogger<C>,
    ) -> Result<RunContext<C>, RunnerError> {
        if !job_dir.is_dir() {
            return Err(RunnerError::MissingJobDir(job_dir.to_path_buf()));
        }
        let run_id = uuid::Uuid::new_v4().to_string();
        logger.append(&format!("run {run_id} starting in {}", job_dir.display()));

        let mut plan = self.load_or_build_plan(job_dir, options, logger).await?;
        self.apply_scheduler(&mut plan, logger);

        let worker = WorkerContractRuntime::new(
            WorkerSettings::from(self.config.as_ref()),
            self.config.adapters.clone(),
            Arc::clone(&self.collab.sequencer),
            Arc::clone(&self.collab.capture),
            self.clock.clone(),
        );
        for step in &plan.steps {
            if matches!(step.kind, StepKind::WorkerContract { .. }) {
                worker.resolve_spec(step)?;
            }
        }

        let step_ids = plan.step_ids();
        let mut dispatch = self.collab.dispatcher.build_dispatch_plan(&plan.steps);

        let now = relay_core::time_fmt::format_rfc3339(self.clock.now());
        let mut status = load_status(job_dir);
        status.sync_steps(&step_ids);
        for note in
            apply_resume_policy(&mut status, &plan, job_dir, self.collab.validator.as_ref(), &now).await
        {
            logger.append(&note);
        }

        if dispatch.execution_mode == ExecutionMode::ParallelLanes {
            let unsupported = unsupported_parallel_types(&plan, &status);
            if !unsupported.is_empty() {
                let reason = format!("unsupported_step_type:{}", unsupported.join(","));
                logger.append(&format!("parallel lanes unavailable ({reason}), running single lane"));
                dispatch.execution_mode = ExecutionMode::SingleLane;
                dispatch.push_fallback_reason(&reason);
            }
        }
        logger.append(&format!(
            "dispatch: mode={} dispatch_mode={} lanes={}",
            dispatch.execution_mode,
            dispatch.dispatch_mode,
            dispatch.lanes.len()
        ));

        plan.dispatch_plan = Some(dispatch.clone());
        let plan_path = job_dir.join(PLAN_FILE);
        persist::write_json(&plan_path, &plan)
            .map_err(|source| RunnerError::Io { path: plan_path.clone(), source })?;

        let (lanes, context) = LaneCoordinator::init_from_config(
            job_dir,
            &run_id,
            &dispatch,
            &step_ids,
            &self.config,
            self.clock.clone(),
        )?;
        log_lane_context(logger, &context);

        status = JobStatus {
            run_id,
            state: JobState::Running,
            mode: dispatch.execution_mode,
            current_step: None,
            current_lane: None,
            failed_step: None,
            failed_lane: None,
            error: None,
            dispatch_mode: dispatch.dispatch_mode.clone(),
            fallback_reason: dispatch.fallback_reason.clone(),
            health: Some(context.health.clone()),
            started_at: now.clone(),
            updated_at: now.clone(),
            finished_at: None,
            steps: status.steps,
        };
        let status = StatusStore::new(job_dir, status, self.clock.clone());
        status.update(|_| ());

        Ok(RunContext {
            job_dir: job_dir.to_path_buf(),
            plan,
            dispatch,
            config: Arc::clone(&self.config),
            collab: self.collab.clone(),
            worker,
            lanes,
            status,
            logger: logger.clone(),
            started_at: now,
        })
    }

    async fn load_or_build_plan(
        &self,
        job_dir: &Path,
        options: &RunOptions,
        logger: &JobLogger<C>,
    ) -> Result<Plan, RunnerError> {
        let plan_path = job_dir.join(PLAN_FILE);
        let brief = BRIEF_FILES.iter().map(|name| job_dir.join(name)).find(|p| p.is_file());
        let need_build = !plan_path.is_file() || options.force_plan;

        let plan = match (need_build, brief) {
            (true, Some(brief_path)) => {
                let design = job_dir.join(DESIGN_FILE);
                let request = PlanRequest {
                    job_dir: job_dir.to_path_buf(),
                    brief_path: brief_path.clone(),
                    design_path: design.is_file().then_some(design),
                    target_name: self.config.active_target.clone(),
                    force: options.force_plan,
                    project_name: self.config.project_name_for(job_dir),
                };
                logger.append(&format!("building plan from {}", brief_path.display()));
                let built = self
                    .collab
                    .plan_builder
                    .create_plan(&request)
                    .await
                    .map_err(RunnerError::PlanBuilder)?;
                read_plan(&built)?
            }
            (true, None) if !plan_path.is_file() => {
                return Err(RunnerError::MissingPlan(job_dir.to_path_buf()));
            }
            _ => {
                if options.force_plan {
                    logger.append("no brief to rebuild from, using existing plan.json");
                }
                read_plan(&plan_path)?
            }
        };
        logger.append(&format!("plan loaded: {} step(s)", plan.steps.len()));
        Ok(plan)
    }

    /// Apply scheduler proposals to steps that still lack a target.
    fn apply_scheduler(&self, plan: &mut Plan, logger: &JobLogger<C>) {
        for assignment in self.collab.scheduler.assign_missing_targets(&plan.steps) {
            let Some(step) = plan.steps.iter_mut().find(|s| s.id == assignment.step_id) else {
                continue;
            };
            if step.declared_target().is_some() {
                continue;
            }
            logger.append(&format!(
                "scheduler: step {} -> {} ({})",
                assignment.step_id, assignment.target, assignment.reason
            ));
            step.target = Some(assignment.target);
        }
    }
}

fn read_plan(path: &Path) -> Result<Plan, RunnerError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| RunnerError::Io { path: path.to_path_buf(), source })?;
    Plan::from_json(&raw)
        .map_err(|source| RunnerError::PlanInvalid { path: path.to_path_buf(), source })
}

/// Distinct step types among queued steps that only run sequentially, in plan order.
fn unsupported_parallel_types(plan: &Plan, status: &JobStatus) -> Vec<&'static str> {
    let mut types = Vec::new();
    for step in &plan.steps {
        let name = step.type_name();
        if status.is_completed(&step.id) || PARALLEL_STEP_TYPES.contains(&name) {
            continue;
        }
        if !types.contains(&name) {
            types.push(name);
        }
    }
    types
}

fn log_lane_context<C: Clock>(logger: &JobLogger<C>, context: &LaneInitContext) {
    for (lane_id, root) in &context.lane_roots {
        let steps = context.step_lanes.values().filter(|l| *l == lane_id).count();
        logger.append(&format!("lane {lane_id}: {} step(s) at {}", steps, root.display()));
    }
    let health = &context.health;
    match (health.usable, health.reason.as_deref()) {
        (true, _) => logger.append(&format!(
            "health snapshot {} usable, healthy targets: {}",
            health.path,
            health.healthy_targets().collect::<Vec<_>>().join(", ")
        )),
        (false, reason) => logger.append(&format!(
            "health snapshot unusable ({}), routing without health",
            reason.unwrap_or("unknown")
        )),
    }
}
