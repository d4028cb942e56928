// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `relay status`.

use crate::prelude::*;
use serde_json::json;

#[test]
fn status_before_any_run_exits_one() {
    let job = Job::empty();
    job.relay().args(&["status", &job.arg()]).exits_with(1).stderr_has("no run recorded");
}

#[test]
fn status_reports_last_run_as_text_and_json() {
    let job = Job::empty();
    job.plan(json!([{ "id": "only", "type": "validate" }]));
    job.relay().args(&["run", &job.arg()]).passes();

    job.relay()
        .args(&["status", &job.arg()])
        .passes()
        .stdout_has(": completed")
        .stdout_has("only")
        .stdout_has("lanes");

    let report = job.relay().args(&["status", &job.arg(), "--format", "json"]).passes().stdout_json();
    assert_eq!(report["status"]["state"], "completed");
    assert_eq!(report["status"]["steps"]["only"]["state"], "completed");
    assert_eq!(report["lane_summary"]["state"], "completed");
}
