// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `relay status`

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::exit_error::{ExitError, JOB_FAILED};
use crate::output::{print_report, JobReport, OutputFormat};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Job directory to inspect
    pub job_dir: PathBuf,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub fn handle(args: StatusArgs) -> Result<()> {
    match JobReport::load(&args.job_dir)? {
        Some(report) => print_report(&report, args.format),
        None => Err(ExitError::new(
            JOB_FAILED,
            format!("no run recorded in {}", args.job_dir.display()),
        )
        .into()),
    }
}
