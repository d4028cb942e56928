// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::resume::{apply_resume_policy, RESUME_VERIFY_FAILED};
use super::*;
use crate::lanes::LANE_SUMMARY_FILE;
use async_trait::async_trait;
use relay_adapters::{FakeCapture, FakePlanBuilder, FakeSequencer, FakeValidator, SendCall};
use relay_core::{FakeClock, JobStatus, Step, StepRunState};
use serde_json::{json, Value};
use tempfile::TempDir;

const RESPOND_OK: &str = r#"printf '%s' '{"status":"ok"}' > "${response_path}""#;

#[derive(Default)]
struct Fakes {
    sequencer: FakeSequencer,
    validator: FakeValidator,
    capture: FakeCapture,
    plan_builder: FakePlanBuilder,
}

impl Fakes {
    fn collaborators(&self, config: &RunnerConfig) -> Collaborators {
        Collaborators {
            plan_builder: Arc::new(self.plan_builder.clone()),
            scheduler: Arc::new(ActiveTargetScheduler::new(config.active_target.clone())),
            dispatcher: Arc::new(TargetPartitionDispatcher::new(config.dispatch.parallel, config.max_lanes)),
            validator: Arc::new(self.validator.clone()),
            capture: Arc::new(self.capture.clone()),
            sequencer: Arc::new(self.sequencer.clone()),
        }
    }

    async fn run(&self, dir: &TempDir, config: RunnerConfig) -> Result<bool, RunnerError> {
        self.run_with(dir, config, RunOptions::default()).await
    }

    async fn run_with(
        &self,
        dir: &TempDir,
        config: RunnerConfig,
        options: RunOptions,
    ) -> Result<bool, RunnerError> {
        let collab = self.collaborators(&config);
        JobRunner::with_collaborators(config, collab, FakeClock::new())
            .run_job(dir.path(), &options)
            .await
    }
}

fn config() -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.worker.poll_interval_s = 0.02;
    config.worker.timeout_s = 5.0;
    config
}

fn parallel_config() -> RunnerConfig {
    let mut config = config();
    config.dispatch.parallel = true;
    config
}

fn write_plan(dir: &TempDir, plan: Value) {
    std::fs::write(dir.path().join(PLAN_FILE), plan.to_string()).unwrap();
}

fn read_status(dir: &TempDir) -> JobStatus {
    serde_json::from_str(&std::fs::read_to_string(dir.path().join(STATUS_FILE)).unwrap()).unwrap()
}

fn read_json(path: PathBuf) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn read_log(dir: &TempDir) -> String {
    std::fs::read_to_string(dir.path().join("log.txt")).unwrap()
}

fn text(id: &str, content: &str) -> Value {
    json!({ "id": id, "type": "text", "content": content, "capture": { "enabled": false } })
}

fn worker(id: &str, target: &str, command: &str) -> Value {
    json!({
        "id": id,
        "type": "worker_contract",
        "target": target,
        "max_retries": 0,
        "worker": { "command": command },
    })
}

#[tokio::test]
async fn sequential_text_steps_all_complete_on_first_attempt() {
    let dir = TempDir::new().unwrap();
    write_plan(
        &dir,
        json!({ "steps": [text("s1", "one"), text("s2", "two"), text("s3", "three")] }),
    );
    let fakes = Fakes::default();

    assert!(fakes.run(&dir, config()).await.unwrap());

    let status = read_status(&dir);
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.mode, ExecutionMode::SingleLane);
    assert!(status.finished_at.is_some());
    for id in ["s1", "s2", "s3"] {
        let step = status.step(id).unwrap();
        assert_eq!(step.state, StepRunState::Completed, "{id}");
        assert_eq!(step.attempts, 1, "{id}");
        assert_eq!(step.target.as_deref(), Some("default"));
    }
    let sent: Vec<_> = fakes
        .sequencer
        .calls()
        .into_iter()
        .map(|call| match call {
            SendCall::Text { text, .. } => text,
            SendCall::Image { path, .. } => path,
        })
        .collect();
    assert_eq!(sent, ["one", "two", "three"]);
    assert!(read_log(&dir).contains("job completed"));

    let summary = read_json(dir.path().join(LANE_SUMMARY_FILE));
    assert_eq!(summary["state"], "completed");
    assert_eq!(summary["lanes"][0]["state"], "completed");
}

#[tokio::test]
async fn failing_step_stops_the_job_and_later_steps_never_run() {
    let dir = TempDir::new().unwrap();
    let mut first = text("step1", "one");
    first["max_retries"] = json!(1);
    write_plan(&dir, json!({ "steps": [first, text("step2", "two")] }));
    let fakes = Fakes::default();
    fakes.validator.always_fail("step1");

    assert!(!fakes.run(&dir, config()).await.unwrap());

    let status = read_status(&dir);
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.failed_step.as_deref(), Some("step1"));
    assert_eq!(status.failed_lane.as_deref(), Some(relay_core::DEFAULT_LANE_ID));
    assert_eq!(status.error.as_deref(), Some("output validation failed"));

    let step1 = status.step("step1").unwrap();
    assert_eq!(step1.state, StepRunState::Failed);
    assert_eq!(step1.attempts, 2);
    let step2 = status.step("step2").unwrap();
    assert_eq!(step2.state, StepRunState::Pending);
    assert_eq!(step2.attempts, 0);

    assert_eq!(fakes.validator.calls(), ["step1", "step1"]);
    assert!(read_log(&dir).contains("job failed at step step1"));
}

#[tokio::test]
async fn flaky_step_succeeds_within_its_retry_budget() {
    let dir = TempDir::new().unwrap();
    let mut step = text("s1", "one");
    step["max_retries"] = json!(2);
    write_plan(&dir, json!([step]));
    let fakes = Fakes::default();
    fakes.validator.fail_times("s1", 2);

    assert!(fakes.run(&dir, config()).await.unwrap());

    let entry = read_status(&dir).step("s1").cloned().unwrap();
    assert_eq!(entry.state, StepRunState::Completed);
    assert_eq!(entry.attempts, 3);
    assert_eq!(entry.last_error, None);

    let lane = read_json(dir.path().join("lanes/lane_1/status.json"));
    assert_eq!(lane["metrics"]["attempts_total"], 3);
    assert_eq!(lane["metrics"]["retries_total"], 2);
    assert_eq!(lane["metrics"]["failed_attempts"], 2);
}

#[tokio::test]
async fn send_failure_without_capture_fallback_fails_the_attempt() {
    let dir = TempDir::new().unwrap();
    let mut step = text("s1", "one");
    step["max_retries"] = json!(0);
    write_plan(&dir, json!([step]));
    let fakes = Fakes::default();
    fakes.sequencer.script(&[false]);

    assert!(!fakes.run(&dir, config()).await.unwrap());
    let status = read_status(&dir);
    assert_eq!(status.error.as_deref(), Some("send to default failed"));
}

#[tokio::test]
async fn capture_persists_reply_to_output_file() {
    let dir = TempDir::new().unwrap();
    write_plan(
        &dir,
        json!([{ "id": "ask", "type": "text", "content": "hi", "output_file": "out/answer.md" }]),
    );
    let fakes = Fakes::default();
    fakes.capture.reply("ask", "the answer");

    assert!(fakes.run(&dir, config()).await.unwrap());

    let written = std::fs::read_to_string(dir.path().join("out/answer.md")).unwrap();
    assert_eq!(written, "the answer");
    assert_eq!(fakes.capture.waits().len(), 1);
}

#[tokio::test]
async fn parallel_request_with_text_steps_falls_back_to_single_lane() {
    let dir = TempDir::new().unwrap();
    let mut a = text("a", "one");
    a["target"] = json!("alpha");
    let mut b = text("b", "two");
    b["target"] = json!("beta");
    write_plan(&dir, json!([a, b]));
    let fakes = Fakes::default();

    assert!(fakes.run(&dir, parallel_config()).await.unwrap());

    let status = read_status(&dir);
    assert_eq!(status.mode, ExecutionMode::SingleLane);
    assert_eq!(status.fallback_reason.as_deref(), Some("unsupported_step_type:text"));

    let plan = read_json(dir.path().join(PLAN_FILE));
    assert_eq!(plan["dispatch_plan"]["execution_mode"], "single_lane");
    assert_eq!(plan["dispatch_plan"]["fallback_reason"], "unsupported_step_type:text");
    assert!(read_log(&dir).contains("unsupported_step_type:text"));
}

#[tokio::test]
async fn parallel_lanes_run_worker_and_validate_steps() {
    let dir = TempDir::new().unwrap();
    write_plan(
        &dir,
        json!([
            worker("a1", "alpha", RESPOND_OK),
            worker("b1", "beta", RESPOND_OK),
            { "id": "a2", "type": "validate", "target": "alpha" },
        ]),
    );
    let fakes = Fakes::default();

    assert!(fakes.run(&dir, parallel_config()).await.unwrap());

    let status = read_status(&dir);
    assert_eq!(status.mode, ExecutionMode::ParallelLanes);
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.step("a1").unwrap().lane_id.as_deref(), Some("lane_1"));
    assert_eq!(status.step("a2").unwrap().lane_id.as_deref(), Some("lane_1"));
    assert_eq!(status.step("b1").unwrap().lane_id.as_deref(), Some("lane_2"));
    assert!(status.steps.values().all(|s| s.state == StepRunState::Completed));

    for lane in ["lane_1", "lane_2"] {
        let lane_status = read_json(dir.path().join("lanes").join(lane).join("status.json"));
        assert_eq!(lane_status["state"], "completed", "{lane}");
        assert!(!dir.path().join("lanes").join(lane).join("lock.json").exists());
    }
    let summary = read_json(dir.path().join(LANE_SUMMARY_FILE));
    assert_eq!(summary["execution_mode"], "parallel_lanes");
    assert_eq!(summary["lanes"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn parallel_failure_stops_other_lanes_at_the_next_step() {
    let dir = TempDir::new().unwrap();
    let slow_ok = format!("sleep 0.5; {RESPOND_OK}");
    write_plan(
        &dir,
        json!([
            worker("a", "alpha", "exit 1"),
            worker("b1", "beta", &slow_ok),
            worker("b2", "beta", RESPOND_OK),
        ]),
    );
    let fakes = Fakes::default();

    assert!(!fakes.run(&dir, parallel_config()).await.unwrap());

    let status = read_status(&dir);
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.failed_step.as_deref(), Some("a"));
    assert_eq!(status.failed_lane.as_deref(), Some("lane_1"));
    assert_eq!(status.step("b1").unwrap().state, StepRunState::Completed);
    let b2 = status.step("b2").unwrap();
    assert_eq!(b2.state, StepRunState::Pending);
    assert_eq!(b2.attempts, 0);

    let summary = read_json(dir.path().join(LANE_SUMMARY_FILE));
    assert_eq!(summary["state"], "failed");
    assert_eq!(summary["lanes"][0]["state"], "degraded");
}

#[tokio::test]
async fn lane_stopped_between_attempts_leaves_its_step_pending() {
    let dir = TempDir::new().unwrap();
    let mut retried = worker("b", "beta", "sleep 0.5; exit 1");
    retried["max_retries"] = json!(2);
    write_plan(&dir, json!([worker("a", "alpha", "exit 1"), retried]));
    let fakes = Fakes::default();

    assert!(!fakes.run(&dir, parallel_config()).await.unwrap());

    let status = read_status(&dir);
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.failed_step.as_deref(), Some("a"));
    let b = status.step("b").unwrap();
    assert_eq!(b.state, StepRunState::Pending);
    assert_eq!(b.attempts, 1);
    assert!(b.last_error.is_some());
    assert!(status.steps.values().all(|s| s.state != StepRunState::Running));
}

#[tokio::test]
async fn timeouts_beyond_the_clock_range_do_not_abort_the_run() {
    let dir = TempDir::new().unwrap();
    let mut step = worker("w", "alpha", RESPOND_OK);
    step["worker"]["timeout_s"] = json!(1e20);
    write_plan(&dir, json!([step]));
    let mut config = config();
    config.worker.timeout_s = 1e20;
    config.completion_timeout_s = 1e20;

    assert!(Fakes::default().run(&dir, config).await.unwrap());
    assert_eq!(read_status(&dir).state, JobState::Completed);
}

/// Validator that crashes on one step.
struct CrashesOn(&'static str);

#[async_trait]
impl StepValidator for CrashesOn {
    async fn validate_step(&self, _job_dir: &Path, step: &Step) -> bool {
        if step.id == self.0 {
            panic!("validator crashed on {}", step.id);
        }
        true
    }
}

#[tokio::test]
async fn crashed_lane_is_blamed_for_the_failure() {
    let dir = TempDir::new().unwrap();
    let slow_ok = format!("sleep 0.5; {RESPOND_OK}");
    let quick_ok = format!("sleep 0.2; {RESPOND_OK}");
    write_plan(
        &dir,
        json!([
            worker("a1", "alpha", RESPOND_OK),
            worker("a2", "alpha", &slow_ok),
            worker("b", "beta", &quick_ok),
        ]),
    );
    let config = parallel_config();
    let fakes = Fakes::default();
    let collab = Collaborators { validator: Arc::new(CrashesOn("b")), ..fakes.collaborators(&config) };

    let succeeded = JobRunner::with_collaborators(config, collab, FakeClock::new())
        .run_job(dir.path(), &RunOptions::default())
        .await
        .unwrap();

    assert!(!succeeded);
    let status = read_status(&dir);
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.failed_step.as_deref(), Some("b"));
    assert_eq!(status.failed_lane.as_deref(), Some("lane_2"));
    assert!(status.error.as_deref().unwrap().starts_with("lane task aborted"));
    assert_eq!(status.step("b").unwrap().state, StepRunState::Failed);
    assert_eq!(status.step("a2").unwrap().state, StepRunState::Completed);
}

#[tokio::test]
async fn resumed_completed_step_failing_verification_runs_again() {
    let dir = TempDir::new().unwrap();
    write_plan(&dir, json!([text("s1", "one"), text("s2", "two")]));
    let mut previous = JobStatus::default();
    previous.sync_steps(&["s1".to_string(), "s2".to_string()]);
    previous.step_mut("s1").state = StepRunState::Completed;
    previous.step_mut("s1").attempts = 1;
    previous.step_mut("s2").state = StepRunState::Completed;
    previous.step_mut("s2").attempts = 1;
    crate::persist::write_json(&dir.path().join(STATUS_FILE), &previous).unwrap();

    let fakes = Fakes::default();
    fakes.validator.fail_times("s1", 1);

    assert!(fakes.run(&dir, config()).await.unwrap());

    let status = read_status(&dir);
    assert_eq!(status.step("s1").unwrap().attempts, 1);
    assert_eq!(status.step("s1").unwrap().state, StepRunState::Completed);
    assert_eq!(fakes.sequencer.calls().len(), 1, "only s1 is resent");
    assert!(read_log(&dir).contains("resume: step s1"));
}

#[tokio::test]
async fn resume_policy_resets_steps_by_previous_state() {
    let dir = TempDir::new().unwrap();
    let plan = relay_core::Plan::from_json(
        &json!([text("done", "a"), text("broken", "b"), text("failed", "c"), text("running", "d")])
            .to_string(),
    )
    .unwrap();
    let mut status = JobStatus::default();
    status.sync_steps(&plan.step_ids());
    for (id, state, attempts) in [
        ("done", StepRunState::Completed, 1),
        ("broken", StepRunState::Completed, 2),
        ("failed", StepRunState::Failed, 3),
        ("running", StepRunState::Running, 2),
    ] {
        let entry = status.step_mut(id);
        entry.state = state;
        entry.attempts = attempts;
    }
    let validator = FakeValidator::new();
    validator.always_fail("broken");

    let notes = apply_resume_policy(&mut status, &plan, dir.path(), &validator, "now").await;

    assert_eq!(notes.len(), 3);
    let done = status.step("done").unwrap();
    assert_eq!((done.state, done.attempts), (StepRunState::Completed, 1));
    let broken = status.step("broken").unwrap();
    assert_eq!((broken.state, broken.attempts), (StepRunState::Pending, 0));
    assert_eq!(broken.last_error.as_deref(), Some(RESUME_VERIFY_FAILED));
    let failed = status.step("failed").unwrap();
    assert_eq!((failed.state, failed.attempts), (StepRunState::Pending, 0));
    let running = status.step("running").unwrap();
    assert_eq!((running.state, running.attempts), (StepRunState::Pending, 2));
    assert_eq!(running.updated_at, "now");
}

#[tokio::test]
async fn interrupted_step_with_spent_budget_fails_without_another_attempt() {
    let dir = TempDir::new().unwrap();
    let mut step = text("s1", "one");
    step["max_retries"] = json!(1);
    write_plan(&dir, json!([step]));
    let mut previous = JobStatus::default();
    previous.sync_steps(&["s1".to_string()]);
    previous.step_mut("s1").state = StepRunState::Running;
    previous.step_mut("s1").attempts = 2;
    previous.step_mut("s1").last_error = Some("killed".into());
    crate::persist::write_json(&dir.path().join(STATUS_FILE), &previous).unwrap();
    let fakes = Fakes::default();

    assert!(!fakes.run(&dir, config()).await.unwrap());

    let status = read_status(&dir);
    let entry = status.step("s1").unwrap();
    assert_eq!(entry.state, StepRunState::Failed);
    assert_eq!(entry.attempts, 2);
    assert_eq!(entry.last_error.as_deref(), Some("attempt budget exhausted (2 of 2 used): killed"));
    assert!(fakes.sequencer.calls().is_empty());
}

#[tokio::test]
async fn missing_plan_and_brief_is_a_startup_error() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::default();

    let err = fakes.run(&dir, config()).await.unwrap_err();

    assert!(matches!(err, RunnerError::MissingPlan(_)), "{err:?}");
    assert!(err.is_config());
    assert!(read_log(&dir).contains("startup failed"));
    assert!(!dir.path().join(STATUS_FILE).exists());
}

#[tokio::test]
async fn missing_job_dir_is_a_startup_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    let fakes = Fakes::default();
    let collab = fakes.collaborators(&config());

    let err = JobRunner::with_collaborators(config(), collab, FakeClock::new())
        .run_job(&missing, &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::MissingJobDir(_)), "{err:?}");
    assert!(!missing.exists());
}

#[tokio::test]
async fn invalid_plan_is_a_startup_error() {
    let dir = TempDir::new().unwrap();
    write_plan(&dir, json!({ "steps": [] }));
    let fakes = Fakes::default();

    let err = fakes.run(&dir, config()).await.unwrap_err();
    assert!(matches!(err, RunnerError::PlanInvalid { .. }), "{err:?}");
}

#[tokio::test]
async fn brief_without_plan_invokes_the_plan_builder() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("brief.md"), "build a thing").unwrap();
    std::fs::write(dir.path().join("design.md"), "design").unwrap();
    let fakes = Fakes {
        plan_builder: FakePlanBuilder::writing(json!([text("s1", "one")]).to_string()),
        ..Fakes::default()
    };
    let mut config = config();
    config.project_name = Some("relay-demo".into());

    assert!(fakes.run(&dir, config).await.unwrap());

    let requests = fakes.plan_builder.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].brief_path, dir.path().join("brief.md"));
    assert_eq!(requests[0].design_path, Some(dir.path().join("design.md")));
    assert_eq!(requests[0].project_name, "relay-demo");
    assert!(!requests[0].force);

    let plan = read_json(dir.path().join(PLAN_FILE));
    assert_eq!(plan["steps"][0]["id"], "s1");
    assert!(plan["dispatch_plan"].is_object());
}

#[tokio::test]
async fn existing_plan_is_kept_unless_forced() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("brief.md"), "brief").unwrap();
    write_plan(&dir, json!([text("old", "x")]));
    let fakes = Fakes {
        plan_builder: FakePlanBuilder::writing(json!([text("new", "y")]).to_string()),
        ..Fakes::default()
    };

    assert!(fakes.run(&dir, config()).await.unwrap());
    assert!(fakes.plan_builder.requests().is_empty());
    assert!(read_status(&dir).step("old").is_some());

    let forced = RunOptions { force_plan: true };
    assert!(fakes.run_with(&dir, config(), forced).await.unwrap());
    assert_eq!(fakes.plan_builder.requests().len(), 1);
    let status = read_status(&dir);
    assert!(status.step("new").is_some());
    assert!(status.step("old").is_none());
}

#[tokio::test]
async fn scheduler_assigns_active_target_to_targetless_steps() {
    let dir = TempDir::new().unwrap();
    let mut pinned = text("pinned", "b");
    pinned["target"] = json!("beta");
    write_plan(&dir, json!([text("free", "a"), pinned]));
    let fakes = Fakes::default();
    let mut config = config();
    config.active_target = "alpha".into();

    assert!(fakes.run(&dir, config).await.unwrap());

    let targets: Vec<_> = fakes
        .sequencer
        .calls()
        .into_iter()
        .map(|call| match call {
            SendCall::Text { target, .. } | SendCall::Image { target, .. } => target,
        })
        .collect();
    assert_eq!(targets, ["alpha", "beta"]);
    let plan = read_json(dir.path().join(PLAN_FILE));
    assert_eq!(plan["steps"][0]["target"], "alpha");
    assert!(read_log(&dir).contains("scheduler: step free -> alpha"));
}

#[tokio::test]
async fn unhealthy_target_is_rerouted_from_snapshot() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("health.json");
    std::fs::write(
        &snapshot,
        json!({ "checked_at": "2026-01-01T00:00:00Z", "targets": { "alpha": false, "beta": true } })
            .to_string(),
    )
    .unwrap();
    let mut step = text("s1", "one");
    step["target"] = json!("alpha");
    write_plan(&dir, json!([step]));
    let fakes = Fakes::default();
    let mut config = config();
    config.health.snapshot_path = Some(snapshot);

    assert!(fakes.run(&dir, config).await.unwrap());

    let status = read_status(&dir);
    let entry = status.step("s1").unwrap();
    assert_eq!(entry.target.as_deref(), Some("beta"));
    assert_eq!(entry.reroute_reason.as_deref(), Some("unhealthy_target:alpha"));
    assert!(status.health.as_ref().is_some_and(|h| h.usable));
    assert!(matches!(
        &fakes.sequencer.calls()[0],
        SendCall::Text { target, .. } if target == "beta"
    ));
}

#[tokio::test]
async fn worker_step_with_undeliverable_spec_is_rejected_at_startup() {
    let dir = TempDir::new().unwrap();
    write_plan(&dir, json!([{ "id": "w", "type": "worker_contract", "worker": { "adapter": "ghost" } }]));
    let fakes = Fakes::default();

    let err = fakes.run(&dir, config()).await.unwrap_err();
    assert!(matches!(err, RunnerError::WorkerStep(_)), "{err:?}");
}
