// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors that stop a run before its steps execute.

use crate::config::ConfigError;
use crate::lanes::LaneError;
use crate::worker_contract::WorkerContractError;
use relay_adapters::AdapterError;
use relay_core::PlanError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("job directory not found: {0}")]
    MissingJobDir(PathBuf),
    #[error("no plan.json and no brief.md/brief.txt in {0}")]
    MissingPlan(PathBuf),
    #[error("invalid plan {path}: {source}")]
    PlanInvalid {
        path: PathBuf,
        #[source]
        source: PlanError,
    },
    #[error("plan builder failed: {0}")]
    PlanBuilder(#[source] AdapterError),
    #[error("invalid worker step: {0}")]
    WorkerStep(#[from] WorkerContractError),
    #[error("lane setup failed: {0}")]
    Lane(#[from] LaneError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    /// Errors an operator fixes by editing config, plan or brief.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            RunnerError::Config(_)
                | RunnerError::MissingJobDir(_)
                | RunnerError::MissingPlan(_)
                | RunnerError::PlanInvalid { .. }
                | RunnerError::PlanBuilder(_)
                | RunnerError::WorkerStep(_)
        )
    }
}
