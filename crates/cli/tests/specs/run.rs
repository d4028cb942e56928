// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `relay run`.

use crate::prelude::*;
use serde_json::json;

fn worker(id: &str, command: &str) -> serde_json::Value {
    json!({ "id": id, "type": "worker_contract", "max_retries": 0, "worker": { "command": command } })
}

fn with(mut step: serde_json::Value, key: &str, value: &str) -> serde_json::Value {
    step[key] = json!(value);
    step
}

#[test]
fn worker_steps_complete_and_materialize_output() {
    let job = Job::empty();
    job.plan(json!([
        with(worker("first", RESPOND_OK), "output_file", "out/first.txt"),
        worker("second", RESPOND_OK),
    ]));

    job.relay()
        .args(&["run", &job.arg()])
        .passes()
        .stdout_has("completed")
        .stdout_has("first")
        .stdout_has("second");

    assert_eq!(job.read("out/first.txt"), "done");
    let status = job.json("status.json");
    assert_eq!(status["state"], "completed");
    assert_eq!(status["steps"]["first"]["attempts"], 1);
    assert!(job.read("log.txt").contains("job completed"));
    assert!(job.path().join("lane_summary.json").is_file());
}

#[test]
fn failed_step_exits_one_and_records_the_failure() {
    let job = Job::empty();
    job.plan(json!([worker("build", "echo boom >&2; exit 3"), worker("ship", RESPOND_OK)]));

    job.relay()
        .args(&["run", &job.arg()])
        .exits_with(1)
        .stdout_has("failed")
        .stderr_has("job failed at step build");

    let status = job.json("status.json");
    assert_eq!(status["failed_step"], "build");
    assert_eq!(status["steps"]["ship"]["attempts"], 0);
    assert!(job.read("artifacts/build/attempt_1_worker_contract/command.log").contains("boom"));
}

#[test]
fn rerun_resumes_after_a_fix() {
    let job = Job::empty();
    job.plan(json!([worker("a", RESPOND_OK), worker("b", "exit 1")]));
    job.relay().args(&["run", &job.arg()]).exits_with(1);

    job.plan(json!([worker("a", RESPOND_OK), worker("b", RESPOND_OK)]));
    job.relay().args(&["run", &job.arg()]).passes();

    let status = job.json("status.json");
    assert_eq!(status["state"], "completed");
    assert_eq!(status["steps"]["a"]["attempts"], 1);
    assert_eq!(status["steps"]["b"]["attempts"], 1);
}

#[test]
fn text_steps_go_through_the_configured_sequencer() {
    let job = Job::empty();
    let sent = job.path().join("sent.txt");
    job.file(
        "relay.toml",
        &format!(
            "[sequencer]\nsend_text_command = '''printf '%s|%s\\n' \"$RELAY_TARGET\" \"$RELAY_SEND_TEXT\" >> \"{}\"'''\n",
            sent.display()
        ),
    );
    job.plan(json!([
        { "id": "hello", "type": "text", "content": "hello there" },
        { "id": "bye", "type": "text", "content": "bye", "target": "beta" },
    ]));

    job.relay().args(&["run", &job.arg(), "--target", "alpha"]).passes();

    assert_eq!(job.read("sent.txt"), "alpha|hello there\nbeta|bye\n");
}

#[test]
fn missing_plan_is_a_config_error() {
    let job = Job::empty();
    job.relay().args(&["run", &job.arg()]).exits_with(2).stderr_has("no plan.json");
    assert!(job.read("log.txt").contains("startup failed"));
}

#[test]
fn malformed_job_config_is_a_config_error() {
    let job = Job::empty();
    job.file("relay.toml", "max_lanes = [");
    job.plan(json!([worker("a", RESPOND_OK)]));
    job.relay().args(&["run", &job.arg()]).exits_with(2);
}

#[test]
fn zero_max_lanes_is_rejected() {
    let job = Job::empty();
    job.plan(json!([worker("a", RESPOND_OK)]));
    job.relay().args(&["run", &job.arg(), "--max-lanes", "0"]).exits_with(2).stderr_has("--max-lanes");
}

#[test]
fn parallel_dispatch_runs_one_lane_per_target() {
    let job = Job::empty();
    job.file("relay.toml", "[dispatch]\nparallel = true\n");
    job.plan(json!([
        with(worker("a", RESPOND_OK), "target", "alpha"),
        with(worker("b", RESPOND_OK), "target", "beta"),
    ]));

    let output = job.relay().args(&["run", &job.arg(), "--format", "json"]).passes();

    let report = output.stdout_json();
    assert_eq!(report["status"]["mode"], "parallel_lanes");
    assert_eq!(report["lane_summary"]["lanes"].as_array().map(Vec::len), Some(2));
    assert!(job.path().join("lanes/lane_1/lane.json").is_file());
    assert!(job.path().join("lanes/lane_2/lane.json").is_file());
}
