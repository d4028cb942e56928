// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn response(status: &str) -> WorkerResponse {
    WorkerResponse { status: status.to_string(), ..WorkerResponse::default() }
}

#[yare::parameterized(
    ok          = { "ok",      true },
    ok_upper    = { "OK",      true },
    success     = { "Success", true },
    padded      = { " ok ",    true },
    failed      = { "failed",  false },
    empty       = { "",        false },
)]
fn success_statuses(status: &str, expected: bool) {
    assert_eq!(response(status).is_success(), expected);
}

#[test]
fn failure_message_prefers_error_field() {
    let mut r = response("error");
    assert_eq!(r.failure_message(), "worker reported status 'error'");
    r.error = Some("tests failed".into());
    assert_eq!(r.failure_message(), "tests failed");
}

#[test]
fn response_keeps_metadata() {
    let r: WorkerResponse = serde_json::from_str(
        r#"{"status": "ok", "output_files": {"src/a.rs": "fn a() {}"}, "model": "x"}"#,
    )
    .unwrap();
    assert_eq!(r.output_files.unwrap().get("src/a.rs").map(String::as_str), Some("fn a() {}"));
    assert_eq!(r.extra.get("model"), Some(&Value::from("x")));
}

#[test]
fn non_string_output_files_are_rejected() {
    let err = serde_json::from_str::<WorkerResponse>(
        r#"{"status": "ok", "output_files": {"a.txt": 3}}"#,
    );
    assert!(err.is_err());
}
