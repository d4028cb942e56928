// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery of text and images to an automation target.

use crate::subprocess::{run_with_timeout, shell_command, tail, SEND_COMMAND_TIMEOUT};
use crate::template::interpolate_shell;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Sends content to a target surface. `false` means the send did not happen.
#[async_trait]
pub trait Sequencer: Send + Sync {
    async fn send_text(&self, text: &str, press_enter: bool, target: &str) -> bool;
    async fn send_image(&self, path: &Path, press_enter: bool, target: &str) -> bool;
}

/// Sequencer that shells out to configured command templates.
///
/// Templates see `${target}`, `${press_enter}` (`1`/`0`) and `${text}` or
/// `${image_path}`. The text is also exported as `RELAY_SEND_TEXT` so long
/// prompts need not pass through the command line.
#[derive(Debug, Clone)]
pub struct CommandSequencer {
    text_command: Option<String>,
    image_command: Option<String>,
    shell: String,
    timeout: Duration,
}

impl CommandSequencer {
    pub fn new(
        text_command: Option<String>,
        image_command: Option<String>,
        shell: impl Into<String>,
    ) -> Self {
        Self { text_command, image_command, shell: shell.into(), timeout: SEND_COMMAND_TIMEOUT }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(
        &self,
        template: Option<&str>,
        vars: BTreeMap<String, String>,
        env: &[(&str, &str)],
        label: &str,
    ) -> bool {
        let Some(template) = template else {
            tracing::warn!(label, "no sequencer command configured, send skipped");
            return false;
        };
        let script = interpolate_shell(template, &vars);
        let mut cmd = shell_command(&self.shell, &script);
        cmd.envs(env.iter().copied());
        match run_with_timeout(cmd, self.timeout, label).await {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                tracing::warn!(
                    label,
                    exit_code = output.status.code().unwrap_or(-1),
                    stderr = %tail(&output.stderr, 400),
                    "sequencer command failed"
                );
                false
            }
            Err(e) => {
                tracing::warn!(label, error = %e, "sequencer command error");
                false
            }
        }
    }
}

fn base_vars(target: &str, press_enter: bool) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("target".to_string(), target.to_string());
    vars.insert("press_enter".to_string(), if press_enter { "1" } else { "0" }.to_string());
    vars
}

#[async_trait]
impl Sequencer for CommandSequencer {
    async fn send_text(&self, text: &str, press_enter: bool, target: &str) -> bool {
        let mut vars = base_vars(target, press_enter);
        vars.insert("text".to_string(), text.to_string());
        self.run(
            self.text_command.as_deref(),
            vars,
            &[("RELAY_SEND_TEXT", text), ("RELAY_TARGET", target)],
            "send_text",
        )
        .await
    }

    async fn send_image(&self, path: &Path, press_enter: bool, target: &str) -> bool {
        let image_path = path.display().to_string();
        let mut vars = base_vars(target, press_enter);
        vars.insert("image_path".to_string(), image_path.clone());
        self.run(
            self.image_command.as_deref(),
            vars,
            &[("RELAY_IMAGE_PATH", image_path.as_str()), ("RELAY_TARGET", target)],
            "send_image",
        )
        .await
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::Sequencer;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Arc;

    /// Recorded send
    #[derive(Debug, Clone, PartialEq)]
    pub enum SendCall {
        Text { text: String, press_enter: bool, target: String },
        Image { path: String, press_enter: bool, target: String },
    }

    #[derive(Default)]
    struct FakeSequencerState {
        calls: Vec<SendCall>,
        /// Scripted results consumed in order; empty means success.
        results: VecDeque<bool>,
    }

    /// Fake sequencer for testing
    #[derive(Clone, Default)]
    pub struct FakeSequencer {
        inner: Arc<Mutex<FakeSequencerState>>,
    }

    impl FakeSequencer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue results for upcoming sends.
        pub fn script(&self, results: &[bool]) {
            self.inner.lock().results.extend(results.iter().copied());
        }

        pub fn calls(&self) -> Vec<SendCall> {
            self.inner.lock().calls.clone()
        }

        fn next(&self, call: SendCall) -> bool {
            let mut inner = self.inner.lock();
            inner.calls.push(call);
            inner.results.pop_front().unwrap_or(true)
        }
    }

    #[async_trait]
    impl Sequencer for FakeSequencer {
        async fn send_text(&self, text: &str, press_enter: bool, target: &str) -> bool {
            self.next(SendCall::Text {
                text: text.to_string(),
                press_enter,
                target: target.to_string(),
            })
        }

        async fn send_image(&self, path: &Path, press_enter: bool, target: &str) -> bool {
            self.next(SendCall::Image {
                path: path.display().to_string(),
                press_enter,
                target: target.to_string(),
            })
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSequencer, SendCall};

#[cfg(test)]
#[path = "sequencer_tests.rs"]
mod tests;
