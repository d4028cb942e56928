// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step output validation.

use async_trait::async_trait;
use relay_core::Step;
use std::path::{Component, Path};

/// Decides whether a step's output is present and acceptable.
#[async_trait]
pub trait StepValidator: Send + Sync {
    async fn validate_step(&self, job_dir: &Path, step: &Step) -> bool;
}

/// Passes steps without an `output_file`; otherwise requires the file to
/// exist under the job directory and be non-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFileValidator;

#[async_trait]
impl StepValidator for OutputFileValidator {
    async fn validate_step(&self, job_dir: &Path, step: &Step) -> bool {
        let Some(rel) = step.output_file.as_deref() else {
            return true;
        };
        let rel = Path::new(rel);
        let escapes = rel.is_absolute()
            || rel.components().any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes {
            tracing::warn!(step_id = %step.id, output_file = %rel.display(), "output_file escapes job dir");
            return false;
        }
        match tokio::fs::metadata(job_dir.join(rel)).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::StepValidator;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_core::Step;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeValidatorState {
        /// Remaining failures per step; `u32::MAX` means always fail.
        failures: HashMap<String, u32>,
        calls: Vec<String>,
    }

    /// Fake validator for testing: passes unless told otherwise.
    #[derive(Clone, Default)]
    pub struct FakeValidator {
        inner: Arc<Mutex<FakeValidatorState>>,
    }

    impl FakeValidator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn always_fail(&self, step_id: &str) {
            self.inner.lock().failures.insert(step_id.to_string(), u32::MAX);
        }

        pub fn fail_times(&self, step_id: &str, times: u32) {
            self.inner.lock().failures.insert(step_id.to_string(), times);
        }

        /// Step ids in validation order.
        pub fn calls(&self) -> Vec<String> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl StepValidator for FakeValidator {
        async fn validate_step(&self, _job_dir: &Path, step: &Step) -> bool {
            let mut inner = self.inner.lock();
            inner.calls.push(step.id.clone());
            match inner.failures.get_mut(&step.id) {
                Some(remaining) if *remaining == u32::MAX => false,
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    false
                }
                _ => true,
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeValidator;

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
