// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness: a temp job directory and fluent assertions on the binary.

use std::path::Path;

use assert_cmd::Command;
use tempfile::TempDir;

/// Command that echoes a successful worker response.
pub const RESPOND_OK: &str = r#"printf '%s' '{"status":"ok","output_text":"done"}' > "${response_path}""#;

/// `relay` with no job directory, isolated from the caller's environment.
pub fn cli() -> Run {
    Run::new(None)
}

pub struct Job {
    dir: TempDir,
}

impl Job {
    pub fn empty() -> Self {
        Self { dir: TempDir::new().unwrap() }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn arg(&self) -> String {
        self.path().display().to_string()
    }

    pub fn file(&self, rel: &str, contents: &str) -> &Self {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
        self
    }

    pub fn plan(&self, steps: serde_json::Value) -> &Self {
        self.file("plan.json", &serde_json::json!({ "steps": steps }).to_string())
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path().join(rel))
            .unwrap_or_else(|e| panic!("failed to read {rel}: {e}"))
    }

    pub fn json(&self, rel: &str) -> serde_json::Value {
        serde_json::from_str(&self.read(rel)).unwrap()
    }

    /// `relay` with this job's state dir.
    pub fn relay(&self) -> Run {
        Run::new(Some(self.path()))
    }
}

pub struct Run {
    cmd: Command,
}

impl Run {
    fn new(job_dir: Option<&Path>) -> Self {
        let mut cmd = Command::cargo_bin("relay").unwrap();
        cmd.env_remove("RELAY_CONFIG")
            .env_remove("RELAY_LOG")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        if let Some(dir) = job_dir {
            cmd.env("RELAY_STATE_DIR", dir.join(".state"));
        }
        Self { cmd }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn passes(mut self) -> Output {
        let output = Output::from(self.cmd.output().unwrap());
        assert_eq!(output.code, Some(0), "expected success\n{output}");
        output
    }

    pub fn exits_with(mut self, code: i32) -> Output {
        let output = Output::from(self.cmd.output().unwrap());
        assert_eq!(output.code, Some(code), "unexpected exit code\n{output}");
        output
    }
}

pub struct Output {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<std::process::Output> for Output {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "--- stdout ---\n{}\n--- stderr ---\n{}", self.stdout, self.stderr)
    }
}

impl Output {
    pub fn stdout_has(&self, needle: &str) -> &Self {
        assert!(self.stdout.contains(needle), "stdout missing {needle:?}\n{self}");
        self
    }

    pub fn stderr_has(&self, needle: &str) -> &Self {
        assert!(self.stderr.contains(needle), "stderr missing {needle:?}\n{self}");
        self
    }

    pub fn stdout_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout).unwrap_or_else(|e| panic!("stdout is not JSON: {e}\n{self}"))
    }
}
