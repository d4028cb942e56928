// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker Contract Runtime.
//!
//! Executes one `worker_contract` step by writing a request document,
//! delegating to chat automation and/or a shell command, then polling for
//! and consuming the adapter's response document.

mod paths;

use crate::config::{secs, RunnerConfig};
use crate::persist;
use relay_adapters::subprocess::{run_with_timeout, shell_command, tail, SubprocessError};
use relay_adapters::template::interpolate_shell;
use relay_adapters::{AdapterError, CaptureRequest, CaptureRuntime, Sequencer};
use relay_core::contract::{COMMAND_LOG_FILE, DIFF_FILE, NOTES_FILE, REQUEST_FILE, RESPONSE_FILE};
use relay_core::time_fmt::format_rfc3339;
use relay_core::{Clock, Step, StepKind, WorkerRequest, WorkerResponse, WorkerSpec, CONTRACT_VERSION};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use paths::{safe_relative_path, UnsafePath};

/// Where `output_text` goes when the step declares no `output_file`.
pub const DEFAULT_OUTPUT_FILE: &str = "output.txt";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum WorkerContractError {
    #[error("step {0} is not a worker_contract step")]
    NotWorkerStep(String),
    #[error("step {step_id}: unknown adapter '{adapter}'")]
    UnknownAdapter { step_id: String, adapter: String },
    #[error("step {step_id}: worker spec needs a command or an automation mode")]
    NoDelegation { step_id: String },
    #[error("step {step_id}: no prompt to send")]
    NoPrompt { step_id: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("send to {target} failed")]
    SendFailed { target: String },
    #[error("capture failed: {0}")]
    Capture(#[source] AdapterError),
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("worker command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },
    #[error("no worker response at {path} after {timeout_s:.1}s")]
    ResponseTimeout { path: PathBuf, timeout_s: f64 },
    #[error("malformed worker response {path}: {message}")]
    MalformedResponse { path: PathBuf, message: String },
    #[error("worker failed: {0}")]
    WorkerFailed(String),
    #[error(transparent)]
    UnsafePath(#[from] UnsafePath),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> WorkerContractError + '_ {
    move |source| WorkerContractError::Io { path: path.to_path_buf(), source }
}

/// Runtime defaults from the runner config.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub timeout_s: f64,
    pub poll_interval_s: f64,
    pub command_timeout_s: Option<f64>,
    pub shell: String,
    pub default_wait_s: f64,
    pub completion_timeout_s: f64,
}

impl From<&RunnerConfig> for WorkerSettings {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            timeout_s: config.worker.timeout_s,
            poll_interval_s: config.worker.poll_interval_s,
            command_timeout_s: config.worker.command_timeout_s,
            shell: config.worker.shell.clone(),
            default_wait_s: config.default_wait_s,
            completion_timeout_s: config.completion_timeout_s,
        }
    }
}

/// One attempt of a worker step.
#[derive(Debug, Clone, Copy)]
pub struct WorkerInvocation<'a> {
    pub job_dir: &'a Path,
    pub step: &'a Step,
    pub attempt: u32,
    pub lane_id: &'a str,
    pub target: &'a str,
}

/// Files of one attempt's contract exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractPaths {
    pub worker_dir: PathBuf,
    pub request: PathBuf,
    pub response: PathBuf,
    pub notes: PathBuf,
    pub diff: PathBuf,
    pub command_log: PathBuf,
}

impl ContractPaths {
    /// `<job_dir>/artifacts/<step_id>/attempt_<n>_worker_contract/`
    pub fn new(job_dir: &Path, step_id: &str, attempt: u32) -> Self {
        let worker_dir = job_dir
            .join("artifacts")
            .join(dir_name(step_id))
            .join(format!("attempt_{attempt}_worker_contract"));
        Self {
            request: worker_dir.join(REQUEST_FILE),
            response: worker_dir.join(RESPONSE_FILE),
            notes: worker_dir.join(NOTES_FILE),
            diff: worker_dir.join(DIFF_FILE),
            command_log: worker_dir.join(COMMAND_LOG_FILE),
            worker_dir,
        }
    }
}

/// Step id as a single safe directory name.
fn dir_name(step_id: &str) -> String {
    let name: String = step_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    match name.trim_matches('.') {
        "" => "_".to_string(),
        _ => name,
    }
}

/// Result of a successful worker step.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub paths: ContractPaths,
    pub response: WorkerResponse,
    /// Files materialized from the response.
    pub written: Vec<PathBuf>,
}

pub struct WorkerContractRuntime<C: Clock> {
    settings: WorkerSettings,
    adapters: BTreeMap<String, WorkerSpec>,
    sequencer: Arc<dyn Sequencer>,
    capture: Arc<dyn CaptureRuntime>,
    clock: C,
}

impl<C: Clock> WorkerContractRuntime<C> {
    pub fn new(
        settings: WorkerSettings,
        adapters: BTreeMap<String, WorkerSpec>,
        sequencer: Arc<dyn Sequencer>,
        capture: Arc<dyn CaptureRuntime>,
        clock: C,
    ) -> Self {
        Self { settings, adapters, sequencer, capture, clock }
    }

    /// The step's inline spec layered over its named adapter's defaults.
    pub fn resolve_spec(&self, step: &Step) -> Result<WorkerSpec, WorkerContractError> {
        if !matches!(step.kind, StepKind::WorkerContract { .. }) {
            return Err(WorkerContractError::NotWorkerStep(step.id.clone()));
        }
        let inline = step.inline_worker().unwrap_or_default();
        let adapter = inline.adapter.as_deref().map(str::trim).filter(|a| !a.is_empty());
        let spec = match adapter.map(|name| (name, self.adapters.get(name))) {
            Some((_, Some(base))) => inline.layered_over(base),
            Some((name, None)) if !inline.has_command() && !inline.is_automation() => {
                return Err(WorkerContractError::UnknownAdapter {
                    step_id: step.id.clone(),
                    adapter: name.to_string(),
                });
            }
            _ => inline,
        };
        if !spec.has_command() && !spec.is_automation() {
            return Err(WorkerContractError::NoDelegation { step_id: step.id.clone() });
        }
        Ok(spec)
    }

    /// Run one attempt of a worker step to a consumed, successful response.
    pub async fn execute(
        &self,
        inv: &WorkerInvocation<'_>,
    ) -> Result<WorkerOutcome, WorkerContractError> {
        let spec = self.resolve_spec(inv.step)?;
        let paths = ContractPaths::new(inv.job_dir, &inv.step.id, inv.attempt);
        tokio::fs::create_dir_all(&paths.worker_dir).await.map_err(io_err(&paths.worker_dir))?;
        match tokio::fs::remove_file(&paths.response).await {
            Ok(()) => tracing::debug!(path = %paths.response.display(), "removed stale response"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&paths.response)(e)),
        }
        self.write_request(inv, &paths)?;

        if spec.is_automation() {
            self.run_automation(inv, &spec, &paths).await?;
        }
        if spec.has_command() {
            self.run_command(inv, &spec, &paths).await?;
        }

        let timeout = secs(spec.timeout_s.unwrap_or(self.settings.timeout_s));
        let poll = secs(spec.poll_interval_s.unwrap_or(self.settings.poll_interval_s))
            .max(MIN_POLL_INTERVAL);
        let response = wait_for_response(&paths.response, timeout, poll).await?;
        if !response.is_success() {
            return Err(WorkerContractError::WorkerFailed(response.failure_message()));
        }
        let written = write_outputs(checked_outputs(inv, &paths, &response)?).await?;
        tracing::info!(
            step_id = %inv.step.id,
            attempt = inv.attempt,
            files = written.len(),
            "worker response consumed"
        );
        Ok(WorkerOutcome { paths, response, written })
    }

    fn write_request(
        &self,
        inv: &WorkerInvocation<'_>,
        paths: &ContractPaths,
    ) -> Result<(), WorkerContractError> {
        let request = WorkerRequest {
            contract_version: CONTRACT_VERSION,
            created_at: format_rfc3339(self.clock.now()),
            job_dir: inv.job_dir.display().to_string(),
            step_id: inv.step.id.clone(),
            attempt: inv.attempt,
            lane_id: inv.lane_id.to_string(),
            target: inv.target.to_string(),
            step: inv.step.clone(),
        };
        persist::write_json(&paths.request, &request).map_err(io_err(&paths.request))
    }

    async fn run_automation(
        &self,
        inv: &WorkerInvocation<'_>,
        spec: &WorkerSpec,
        paths: &ContractPaths,
    ) -> Result<(), WorkerContractError> {
        let text = prompt_text(inv, spec).await?;
        let options = match (&inv.step.capture, &spec.capture) {
            (Some(step), Some(base)) => step.layered_over(base),
            (step, base) => step.clone().or_else(|| base.clone()).unwrap_or_default(),
        };
        let capture_enabled = options.is_enabled();
        let baseline = if capture_enabled {
            self.capture.capture_signature(inv.target).await
        } else {
            None
        };

        let press_enter = spec.press_enter.unwrap_or(inv.step.press_enter);
        if !self.sequencer.send_text(&text, press_enter, inv.target).await {
            return Err(WorkerContractError::SendFailed { target: inv.target.to_string() });
        }
        let wait = spec.wait.unwrap_or_else(|| inv.step.wait_s(self.settings.default_wait_s));
        tokio::time::sleep(secs(wait)).await;

        let mut response = json!({
            "status": "ok",
            "captured": false,
            "mode": spec.mode.clone().unwrap_or_else(|| relay_core::plan::AUTOMATION_MODE.to_string()),
            "target": inv.target,
        });
        if capture_enabled {
            let req = CaptureRequest {
                job_dir: inv.job_dir.to_path_buf(),
                step: inv.step.clone(),
                attempt: inv.attempt,
                lane_id: inv.lane_id.to_string(),
                target: inv.target.to_string(),
                baseline_signature: baseline,
                timeout: secs(options.timeout_s.unwrap_or(self.settings.completion_timeout_s)),
                require_fresh: options
                    .require_fresh
                    .unwrap_or_else(|| self.capture.default_require_fresh_capture()),
                options,
            };
            let outcome =
                self.capture.wait_for_completion(&req).await.map_err(WorkerContractError::Capture)?;
            let artifacts = self
                .capture
                .persist_step_artifacts(&req, &outcome)
                .await
                .map_err(WorkerContractError::Capture)?;
            let output_text = match (&outcome.text, artifacts.first()) {
                (Some(text), _) => Some(text.clone()),
                (None, Some(path)) => tokio::fs::read_to_string(path).await.ok(),
                (None, None) => None,
            };
            response["captured"] = json!(true);
            response["output_text"] = json!(output_text);
            response["signature"] = json!(outcome.signature);
            response["fresh"] = json!(outcome.fresh);
            response["artifacts"] = json!(artifacts
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>());
        }
        persist::write_json(&paths.response, &response).map_err(io_err(&paths.response))
    }

    async fn run_command(
        &self,
        inv: &WorkerInvocation<'_>,
        spec: &WorkerSpec,
        paths: &ContractPaths,
    ) -> Result<(), WorkerContractError> {
        let Some(template) = spec.command.as_deref() else {
            return Ok(());
        };
        let vars = command_vars(inv, spec, paths);
        let script = interpolate_shell(template, &vars);
        let mut cmd = shell_command(&self.settings.shell, &script);
        cmd.current_dir(inv.job_dir);
        cmd.envs(&spec.env);
        cmd.envs([
            ("RELAY_JOB_DIR", vars["job_dir"].as_str()),
            ("RELAY_STEP_ID", inv.step.id.as_str()),
            ("RELAY_ATTEMPT", vars["attempt"].as_str()),
            ("RELAY_LANE_ID", inv.lane_id),
            ("RELAY_TARGET", inv.target),
            ("RELAY_REQUEST_PATH", vars["request_path"].as_str()),
            ("RELAY_RESPONSE_PATH", vars["response_path"].as_str()),
            ("RELAY_WORKER_DIR", vars["worker_dir"].as_str()),
        ]);

        let timeout_s = spec
            .command_timeout_s
            .or(self.settings.command_timeout_s)
            .or(spec.timeout_s)
            .unwrap_or(self.settings.timeout_s);
        tracing::debug!(step_id = %inv.step.id, command = %script, "running worker command");
        let result = run_with_timeout(cmd, secs(timeout_s), "worker command").await;

        let log = match &result {
            Ok(output) => format!(
                "$ {script}\nexit code: {}\n--- stdout ---\n{}\n--- stderr ---\n{}\n",
                output.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            ),
            Err(e) => format!("$ {script}\nerror: {e}\n"),
        };
        tokio::fs::write(&paths.command_log, log).await.map_err(io_err(&paths.command_log))?;

        let output = result?;
        if !output.status.success() {
            return Err(WorkerContractError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: tail(&output.stderr, 400),
            });
        }
        Ok(())
    }
}

/// Text sent on the automation path: `worker.prompt`, else step content, else the prompt file.
async fn prompt_text(
    inv: &WorkerInvocation<'_>,
    spec: &WorkerSpec,
) -> Result<String, WorkerContractError> {
    if let Some(prompt) = spec.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        return Ok(prompt.to_string());
    }
    let StepKind::WorkerContract { content, prompt_file, .. } = &inv.step.kind else {
        return Err(WorkerContractError::NotWorkerStep(inv.step.id.clone()));
    };
    if let Some(content) = content.as_deref().filter(|c| !c.trim().is_empty()) {
        return Ok(content.to_string());
    }
    match prompt_file.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(file) => {
            let path = inv.job_dir.join(file);
            tokio::fs::read_to_string(&path).await.map_err(io_err(&path))
        }
        None => Err(WorkerContractError::NoPrompt { step_id: inv.step.id.clone() }),
    }
}

/// Template variables. Built-ins win over adapter-supplied `command_vars`.
fn command_vars(
    inv: &WorkerInvocation<'_>,
    spec: &WorkerSpec,
    paths: &ContractPaths,
) -> BTreeMap<String, String> {
    let mut vars = spec.command_vars.clone();
    let show = |p: &Path| p.display().to_string();
    vars.extend([
        ("job_dir".to_string(), show(inv.job_dir)),
        ("step_id".to_string(), inv.step.id.clone()),
        ("attempt".to_string(), inv.attempt.to_string()),
        ("lane_id".to_string(), inv.lane_id.to_string()),
        ("target".to_string(), inv.target.to_string()),
        ("request_path".to_string(), show(&paths.request)),
        ("response_path".to_string(), show(&paths.response)),
        ("notes_path".to_string(), show(&paths.notes)),
        ("diff_path".to_string(), show(&paths.diff)),
        ("worker_dir".to_string(), show(&paths.worker_dir)),
    ]);
    vars
}

/// Poll for the response document, then parse it.
async fn wait_for_response(
    path: &Path,
    timeout: Duration,
    poll: Duration,
) -> Result<WorkerResponse, WorkerContractError> {
    let deadline = tokio::time::Instant::now().checked_add(timeout);
    while !path.is_file() {
        let now = tokio::time::Instant::now();
        let pause = match deadline {
            Some(deadline) if now >= deadline => {
                return Err(WorkerContractError::ResponseTimeout {
                    path: path.to_path_buf(),
                    timeout_s: timeout.as_secs_f64(),
                });
            }
            Some(deadline) => poll.min(deadline - now),
            // Beyond the clock's range: poll until the response shows up.
            None => poll,
        };
        tokio::time::sleep(pause).await;
    }
    let raw = tokio::fs::read_to_string(path).await.map_err(io_err(path))?;
    parse_response(path, &raw)
}

fn parse_response(path: &Path, raw: &str) -> Result<WorkerResponse, WorkerContractError> {
    let malformed = |message: String| WorkerContractError::MalformedResponse {
        path: path.to_path_buf(),
        message,
    };
    let value: Value = serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(malformed("response is not a JSON object".into()));
    }
    serde_json::from_value(value).map_err(|e| malformed(e.to_string()))
}

/// The response's payload as `(destination, content)` pairs. Every
/// destination is checked here, before anything is written.
fn checked_outputs<'r>(
    inv: &WorkerInvocation<'_>,
    paths: &ContractPaths,
    response: &'r WorkerResponse,
) -> Result<Vec<(PathBuf, &'r str)>, WorkerContractError> {
    let mut writes = Vec::new();
    if let Some(notes) = response.notes_md.as_deref() {
        writes.push((paths.notes.clone(), notes));
    }
    if let Some(diff) = response.diff_patch.as_deref() {
        writes.push((paths.diff.clone(), diff));
    }
    if let Some(text) = response.output_text.as_deref() {
        let dest = match inv.step.output_file.as_deref() {
            Some(rel) => inv.job_dir.join(safe_relative_path(rel)?),
            None => paths.worker_dir.join(DEFAULT_OUTPUT_FILE),
        };
        writes.push((dest, text));
    }
    for (rel, content) in response.output_files.iter().flatten() {
        writes.push((inv.job_dir.join(safe_relative_path(rel)?), content.as_str()));
    }
    Ok(writes)
}

async fn write_outputs(writes: Vec<(PathBuf, &str)>) -> Result<Vec<PathBuf>, WorkerContractError> {
    let mut written = Vec::with_capacity(writes.len());
    for (path, content) in writes {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }
        tokio::fs::write(&path, content).await.map_err(io_err(&path))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
