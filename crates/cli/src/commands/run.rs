// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `relay run`

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use relay_engine::{JobRunner, RunOptions, RunnerConfig};

use crate::exit_error::{ExitError, JOB_FAILED};
use crate::output::{print_report, JobReport, OutputFormat};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Job directory holding `plan.json` or a brief to build one from
    pub job_dir: PathBuf,

    /// Config file (overrides RELAY_CONFIG and `<job_dir>/relay.toml`)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Active target for steps that declare none
    #[arg(long)]
    pub target: Option<String>,

    /// Upper bound on lanes executing at once
    #[arg(long)]
    pub max_lanes: Option<usize>,

    /// Rebuild `plan.json` from the brief even if it exists
    #[arg(long)]
    pub force_plan: bool,

    /// Report format printed when the run ends
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Apply command-line overrides on top of the loaded config.
pub fn resolve_config(args: &RunArgs) -> Result<RunnerConfig, ExitError> {
    let mut config = RunnerConfig::load(args.config.as_deref(), &args.job_dir)
        .map_err(|e| ExitError::config(e.to_string()))?;
    if let Some(target) = args.target.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        config.active_target = target.to_string();
    }
    match args.max_lanes {
        Some(0) => return Err(ExitError::config("--max-lanes must be at least 1")),
        Some(n) => config.max_lanes = n,
        None => {}
    }
    Ok(config)
}

pub async fn handle(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let runner = JobRunner::new(config);
    let options = RunOptions { force_plan: args.force_plan };

    let succeeded = match runner.run_job(&args.job_dir, &options).await {
        Ok(succeeded) => succeeded,
        Err(e) if e.is_config() => return Err(ExitError::config(e.to_string()).into()),
        Err(e) => return Err(ExitError::new(JOB_FAILED, e.to_string()).into()),
    };

    if let Some(report) = JobReport::load(&args.job_dir)? {
        print_report(&report, args.format)?;
        if !succeeded {
            let step = report.status.failed_step.unwrap_or_else(|| "?".into());
            let error = report.status.error.unwrap_or_else(|| "unknown error".into());
            return Err(ExitError::new(JOB_FAILED, format!("job failed at step {step}: {error}")).into());
        }
    } else if !succeeded {
        return Err(ExitError::new(JOB_FAILED, "job failed").into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
