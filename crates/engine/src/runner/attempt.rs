// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-step attempt loop shared by both executors.

use super::RunContext;
use crate::config::secs;
use crate::worker_contract::WorkerInvocation;
use relay_adapters::CaptureRequest;
use relay_core::{Clock, Step, StepKind, StepRunState};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a step's attempt loop ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StepOutcome {
    Completed,
    /// All attempts failed; carries the last error.
    Failed(String),
    /// The stop signal was set before the step finished.
    Stopped,
}

enum Payload {
    Text(String),
    Image(PathBuf),
}

impl<C: Clock> RunContext<C> {
    /// Attempt a step until it succeeds, its budget runs out, or `stop` is set.
    ///
    /// Attempts continue from the recorded count, so at most
    /// `max_retries + 1` attempts are made across resumes.
    pub(crate) async fn run_step(
        &self,
        step: &Step,
        lane_id: &str,
        stop: Option<&CancellationToken>,
    ) -> StepOutcome {
        let first = self.status.step_attempts(&step.id).saturating_add(1).max(1);
        let max = step.max_attempts();

        for attempt in first..=max {
            if stop.is_some_and(CancellationToken::is_cancelled) {
                self.status.update_step(&step.id, |entry| entry.state = StepRunState::Pending);
                self.log(&format!("step {} stopped before attempt {attempt}", step.id));
                return StepOutcome::Stopped;
            }
            if self.run_attempt(step, lane_id, attempt).await.is_ok() {
                return StepOutcome::Completed;
            }
        }

        let error = match self.status.step_error(&step.id) {
            Some(last) if first <= max => last,
            last => format!(
                "attempt budget exhausted ({max} of {max} used){}",
                last.map(|e| format!(": {e}")).unwrap_or_default()
            ),
        };
        self.status.update_step(&step.id, |entry| {
            entry.state = StepRunState::Failed;
            entry.last_error = Some(error.clone());
        });
        let attempts = self.status.step_attempts(&step.id);
        self.log(&format!("step {} failed after {attempts} attempt(s): {error}", step.id));
        StepOutcome::Failed(error)
    }

    /// One attempt. Errors are recorded, never propagated past the loop.
    async fn run_attempt(&self, step: &Step, lane_id: &str, attempt: u32) -> Result<(), String> {
        let started = Instant::now();
        self.status.update(|status| {
            status.current_step = Some(step.id.clone());
            status.current_lane = Some(lane_id.to_string());
        });
        self.status.update_step(&step.id, |entry| {
            entry.state = StepRunState::Running;
            entry.attempts = attempt;
            entry.lane_id = Some(lane_id.to_string());
        });

        let result = self.attempt_chain(step, lane_id, attempt).await;

        let duration_s = started.elapsed().as_secs_f64();
        if let Err(e) = self.lanes.finish_step_attempt(
            lane_id,
            &step.id,
            attempt,
            result.is_ok(),
            duration_s,
            result.as_ref().err().map(String::as_str),
        ) {
            tracing::warn!(lane_id, step_id = %step.id, error = %e, "failed to record attempt end");
        }

        match &result {
            Ok(()) => {
                self.status.update_step(&step.id, |entry| {
                    entry.state = StepRunState::Completed;
                    entry.last_error = None;
                });
                self.log(&format!("step {} completed on attempt {attempt} ({duration_s:.1}s)", step.id));
            }
            Err(e) => {
                self.status.update_step(&step.id, |entry| entry.last_error = Some(e.clone()));
                tracing::warn!(step_id = %step.id, lane_id, attempt, error = %e, "attempt failed");
                self.log(&format!(
                    "step {} attempt {attempt}/{} failed: {e}",
                    step.id,
                    step.max_attempts()
                ));
            }
        }
        result
    }

    async fn attempt_chain(&self, step: &Step, lane_id: &str, attempt: u32) -> Result<(), String> {
        let route = self
            .lanes
            .resolve_target(step.declared_target(), lane_id)
            .map_err(|e| e.to_string())?;
        if let Some(reason) = &route.reroute_reason {
            self.log(&format!("step {} rerouted to {} ({reason})", step.id, route.target));
        }
        self.status.update_step(&step.id, |entry| {
            entry.target = Some(route.target.clone());
            entry.reroute_reason = route.reroute_reason.clone();
        });
        self.log(&format!(
            "step {} ({}) attempt {attempt}/{} on {} [lane {lane_id}]",
            step.id,
            step.type_name(),
            step.max_attempts(),
            route.target
        ));
        self.lanes
            .start_step_attempt(lane_id, &step.id, attempt, &route.target, route.reroute_reason.as_deref())
            .map_err(|e| e.to_string())?;

        match &step.kind {
            StepKind::Validate => {}
            StepKind::WorkerContract { .. } => {
                let inv = WorkerInvocation {
                    job_dir: &self.job_dir,
                    step,
                    attempt,
                    lane_id,
                    target: &route.target,
                };
                self.worker.execute(&inv).await.map_err(|e| e.to_string())?;
            }
            StepKind::Text { content, prompt_file } => {
                let text =
                    text_payload(&self.job_dir, content.as_deref(), prompt_file.as_deref()).await?;
                self.send_and_capture(step, lane_id, attempt, &route.target, Payload::Text(text))
                    .await?;
            }
            StepKind::Image { image_path } => {
                let path = self.job_dir.join(image_path);
                self.send_and_capture(step, lane_id, attempt, &route.target, Payload::Image(path))
                    .await?;
            }
        }

        if !self.collab.validator.validate_step(&self.job_dir, step).await {
            return Err("output validation failed".to_string());
        }
        Ok(())
    }

    async fn send_and_capture(
        &self,
        step: &Step,
        lane_id: &str,
        attempt: u32,
        target: &str,
        payload: Payload,
    ) -> Result<(), String> {
        let capture = &self.collab.capture;
        let options = step.capture.clone().unwrap_or_default();
        let capture_enabled = options.is_enabled();
        let baseline =
            if capture_enabled { capture.capture_signature(target).await } else { None };

        let sent = match &payload {
            Payload::Text(text) => self.collab.sequencer.send_text(text, step.press_enter, target).await,
            Payload::Image(path) => self.collab.sequencer.send_image(path, step.press_enter, target).await,
        };
        if !sent {
            let fallback = capture_enabled
                && (options.fallback == Some(true) || capture.can_capture_fallback(step));
            if !fallback {
                return Err(format!("send to {target} failed"));
            }
            self.log(&format!("step {}: send failed, falling back to capture-only completion", step.id));
        }

        tokio::time::sleep(secs(step.wait_s(self.config.default_wait_s))).await;
        if !capture_enabled {
            return Ok(());
        }

        let request = CaptureRequest {
            job_dir: self.job_dir.clone(),
            step: step.clone(),
            attempt,
            lane_id: lane_id.to_string(),
            target: target.to_string(),
            baseline_signature: baseline,
            timeout: secs(options.timeout_s.unwrap_or(self.config.completion_timeout_s)),
            require_fresh: options
                .require_fresh
                .unwrap_or_else(|| capture.default_require_fresh_capture()),
            options,
        };
        let outcome = capture.wait_for_completion(&request).await.map_err(|e| e.to_string())?;
        if request.require_fresh && !outcome.fresh {
            return Err("captured content did not change after sending".to_string());
        }
        let written =
            capture.persist_step_artifacts(&request, &outcome).await.map_err(|e| e.to_string())?;
        tracing::debug!(step_id = %step.id, files = written.len(), "capture artifacts persisted");
        Ok(())
    }

    /// Log the estimated time left for `remaining` steps.
    pub(crate) fn log_eta(&self, remaining: &[Step]) {
        let pending: Vec<&Step> =
            remaining.iter().filter(|s| !self.status.is_completed(&s.id)).collect();
        if pending.is_empty() {
            return;
        }
        let eta_s: f64 = pending
            .iter()
            .map(|s| s.wait_s(self.config.default_wait_s) + self.config.completion_timeout_s.max(0.0))
            .sum();
        self.log(&format!("eta: ~{eta_s:.0}s for {} remaining step(s)", pending.len()));
    }
}

async fn text_payload(
    job_dir: &Path,
    content: Option<&str>,
    prompt_file: Option<&str>,
) -> Result<String, String> {
    if let Some(content) = content {
        return Ok(content.to_string());
    }
    match prompt_file {
        Some(file) => {
            let path = job_dir.join(file);
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| format!("failed to read prompt file {}: {e}", path.display()))
        }
        None => Err("text step has no content".to_string()),
    }
}
