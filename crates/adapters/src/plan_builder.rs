// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compiling a brief into a plan.

use crate::error::AdapterError;
use crate::subprocess::{run_with_timeout, shell_command, tail, PLAN_BUILDER_TIMEOUT};
use crate::template::interpolate_shell;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Inputs for compiling a brief into `plan.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub job_dir: PathBuf,
    pub brief_path: PathBuf,
    pub design_path: Option<PathBuf>,
    pub target_name: String,
    pub force: bool,
    pub project_name: String,
}

impl PlanRequest {
    pub fn plan_path(&self) -> PathBuf {
        self.job_dir.join("plan.json")
    }

    fn vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("job_dir".into(), self.job_dir.display().to_string());
        vars.insert("brief_path".into(), self.brief_path.display().to_string());
        vars.insert(
            "design_path".into(),
            self.design_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
        );
        vars.insert("target".into(), self.target_name.clone());
        vars.insert("force".into(), if self.force { "1" } else { "0" }.into());
        vars.insert("project_name".into(), self.project_name.clone());
        vars.insert("plan_path".into(), self.plan_path().display().to_string());
        vars
    }
}

/// Writes `plan.json` for a job from its brief. Returns the plan path.
#[async_trait]
pub trait PlanBuilder: Send + Sync {
    async fn create_plan(&self, req: &PlanRequest) -> Result<PathBuf, AdapterError>;
}

/// Plan builder that runs a configured command template in the job directory.
#[derive(Debug, Clone)]
pub struct CommandPlanBuilder {
    command: Option<String>,
    shell: String,
    timeout: Duration,
}

impl CommandPlanBuilder {
    pub fn new(command: Option<String>, shell: impl Into<String>) -> Self {
        Self { command, shell: shell.into(), timeout: PLAN_BUILDER_TIMEOUT }
    }
}

#[async_trait]
impl PlanBuilder for CommandPlanBuilder {
    async fn create_plan(&self, req: &PlanRequest) -> Result<PathBuf, AdapterError> {
        let template = self
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or(AdapterError::NotConfigured("plan builder command"))?;
        let script = interpolate_shell(template, &req.vars());
        let mut cmd = shell_command(&self.shell, &script);
        cmd.current_dir(&req.job_dir);
        let output = run_with_timeout(cmd, self.timeout, "plan builder").await?;
        if !output.status.success() {
            return Err(AdapterError::CommandFailed {
                label: "plan builder".to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: tail(&output.stderr, 400),
            });
        }
        let plan_path = req.plan_path();
        if !plan_path.is_file() {
            return Err(AdapterError::Failed(format!(
                "plan builder finished but {} was not written",
                plan_path.display()
            )));
        }
        Ok(plan_path)
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{PlanBuilder, PlanRequest};
    use crate::error::AdapterError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Fake plan builder that writes a fixed plan document.
    #[derive(Clone, Default)]
    pub struct FakePlanBuilder {
        plan_json: Option<String>,
        requests: Arc<Mutex<Vec<PlanRequest>>>,
    }

    impl FakePlanBuilder {
        pub fn writing(plan_json: impl Into<String>) -> Self {
            Self { plan_json: Some(plan_json.into()), requests: Arc::default() }
        }

        pub fn requests(&self) -> Vec<PlanRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl PlanBuilder for FakePlanBuilder {
        async fn create_plan(&self, req: &PlanRequest) -> Result<PathBuf, AdapterError> {
            self.requests.lock().push(req.clone());
            let plan = self.plan_json.as_deref().ok_or(AdapterError::NotConfigured("fake plan"))?;
            let path = req.plan_path();
            std::fs::write(&path, plan)?;
            Ok(path)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakePlanBuilder;

#[cfg(test)]
#[path = "plan_builder_tests.rs"]
mod tests;
