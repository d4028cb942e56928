// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output capture and completion detection.

use crate::error::AdapterError;
use async_trait::async_trait;
use relay_core::{CaptureOptions, Step};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;

/// Everything a capture runtime needs to watch one attempt.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub job_dir: PathBuf,
    pub step: Step,
    pub attempt: u32,
    pub lane_id: String,
    pub target: String,
    /// Signature of the surface before sending, if one was taken.
    pub baseline_signature: Option<String>,
    pub timeout: Duration,
    pub require_fresh: bool,
    pub options: CaptureOptions,
}

/// Result of a completed capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOutcome {
    pub text: Option<String>,
    pub signature: Option<String>,
    /// True when the captured content differs from the baseline.
    pub fresh: bool,
}

/// Watches a target surface for new content.
#[async_trait]
pub trait CaptureRuntime: Send + Sync {
    /// Current text of the target surface, if it can be read.
    async fn capture_source_text(&self, target: &str) -> Option<String>;

    /// Content signature of the target surface (SHA-256 of its text).
    async fn capture_signature(&self, target: &str) -> Option<String> {
        let text = self.capture_source_text(target).await?;
        Some(signature_of(&text))
    }

    /// Block until the target shows a completed response or the timeout elapses.
    async fn wait_for_completion(&self, req: &CaptureRequest) -> Result<CaptureOutcome, AdapterError>;

    /// Write capture artifacts for the attempt; returns the files written.
    async fn persist_step_artifacts(
        &self,
        req: &CaptureRequest,
        outcome: &CaptureOutcome,
    ) -> Result<Vec<PathBuf>, AdapterError>;

    /// Whether a failed send may still complete by capture alone.
    fn can_capture_fallback(&self, step: &Step) -> bool;

    fn default_require_fresh_capture(&self) -> bool;
}

/// Hex SHA-256 of captured text.
pub fn signature_of(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Capture runtime for deployments without a readable surface.
///
/// Completes immediately with no text and persists nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCapture;

#[async_trait]
impl CaptureRuntime for NoopCapture {
    async fn capture_source_text(&self, _target: &str) -> Option<String> {
        None
    }

    async fn wait_for_completion(&self, _req: &CaptureRequest) -> Result<CaptureOutcome, AdapterError> {
        Ok(CaptureOutcome::default())
    }

    async fn persist_step_artifacts(
        &self,
        _req: &CaptureRequest,
        _outcome: &CaptureOutcome,
    ) -> Result<Vec<PathBuf>, AdapterError> {
        Ok(Vec::new())
    }

    fn can_capture_fallback(&self, _step: &Step) -> bool {
        false
    }

    fn default_require_fresh_capture(&self) -> bool {
        false
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{signature_of, CaptureOutcome, CaptureRequest, CaptureRuntime};
    use crate::error::AdapterError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_core::Step;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeCaptureState {
        surface: HashMap<String, String>,
        replies: HashMap<String, String>,
        timeouts: HashSet<String>,
        fallback_steps: HashSet<String>,
        waits: Vec<CaptureRequest>,
    }

    /// Fake capture runtime for testing.
    ///
    /// Completion returns the scripted reply for the step (or empty text);
    /// persisting writes the reply to the step's `output_file`.
    #[derive(Clone, Default)]
    pub struct FakeCapture {
        inner: Arc<Mutex<FakeCaptureState>>,
    }

    impl FakeCapture {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_surface(&self, target: &str, text: &str) {
            self.inner.lock().surface.insert(target.to_string(), text.to_string());
        }

        pub fn reply(&self, step_id: &str, text: &str) {
            self.inner.lock().replies.insert(step_id.to_string(), text.to_string());
        }

        pub fn time_out(&self, step_id: &str) {
            self.inner.lock().timeouts.insert(step_id.to_string());
        }

        pub fn allow_fallback(&self, step_id: &str) {
            self.inner.lock().fallback_steps.insert(step_id.to_string());
        }

        pub fn waits(&self) -> Vec<CaptureRequest> {
            self.inner.lock().waits.clone()
        }
    }

    #[async_trait]
    impl CaptureRuntime for FakeCapture {
        async fn capture_source_text(&self, target: &str) -> Option<String> {
            self.inner.lock().surface.get(target).cloned()
        }

        async fn wait_for_completion(
            &self,
            req: &CaptureRequest,
        ) -> Result<CaptureOutcome, AdapterError> {
            let mut inner = self.inner.lock();
            inner.waits.push(req.clone());
            if inner.timeouts.contains(&req.step.id) {
                return Err(AdapterError::CompletionTimeout(req.timeout.as_secs_f64()));
            }
            let text = inner.replies.get(&req.step.id).cloned().unwrap_or_default();
            let signature = signature_of(&text);
            let fresh = req.baseline_signature.as_deref() != Some(signature.as_str());
            Ok(CaptureOutcome { text: Some(text), signature: Some(signature), fresh })
        }

        async fn persist_step_artifacts(
            &self,
            req: &CaptureRequest,
            outcome: &CaptureOutcome,
        ) -> Result<Vec<PathBuf>, AdapterError> {
            let (Some(rel), Some(text)) = (req.step.output_file.as_deref(), outcome.text.as_deref())
            else {
                return Ok(Vec::new());
            };
            let path = req.job_dir.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, text)?;
            Ok(vec![path])
        }

        fn can_capture_fallback(&self, step: &Step) -> bool {
            self.inner.lock().fallback_steps.contains(&step.id)
        }

        fn default_require_fresh_capture(&self) -> bool {
            false
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCapture;

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
