// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with a hard timeout.

use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Timeout for sequencer commands (a paste should never take this long).
pub const SEND_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for the plan builder command.
pub const PLAN_BUILDER_TIMEOUT: Duration = Duration::from_secs(900);

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{label}: failed to start: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{label}: failed while waiting: {source}")]
    Wait {
        label: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{label}: timed out after {:.1}s", timeout.as_secs_f64())]
    Timeout { label: String, timeout: Duration },
}

/// Build `<shell> -c <script>`.
pub fn shell_command(shell: &str, script: &str) -> Command {
    let mut cmd = Command::new(shell);
    cmd.arg("-c").arg(script);
    cmd
}

/// Run a command to completion, capturing stdout/stderr.
///
/// stdin is closed. The child is killed if the timeout elapses.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, SubprocessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let child = cmd
        .spawn()
        .map_err(|source| SubprocessError::Spawn { label: label.to_string(), source })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(SubprocessError::Wait { label: label.to_string(), source }),
        Err(_) => {
            tracing::warn!(label, timeout_s = timeout.as_secs_f64(), "subprocess timed out, killed");
            Err(SubprocessError::Timeout { label: label.to_string(), timeout })
        }
    }
}

/// Trimmed tail of a captured stream, for error messages.
pub fn tail(bytes: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - max_chars).collect()
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
