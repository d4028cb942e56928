// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! relay-engine: the plan runner
//!
//! Configuration, the health snapshot loader, the lane runtime coordinator,
//! the worker contract runtime and the job runner that drives them.

pub mod config;
pub mod env;
mod error;
pub mod health;
pub mod job_logger;
pub mod lanes;
pub mod persist;
pub mod runner;
pub mod worker_contract;

pub use config::{ConfigError, ReroutePolicy, RunnerConfig};
pub use error::RunnerError;
pub use health::load_health_snapshot;
pub use job_logger::JobLogger;
pub use lanes::{LaneCoordinator, LaneError, LaneInitContext, LaneSettings, RouteDecision, LANE_SUMMARY_FILE};
pub use runner::{Collaborators, JobRunner, RunOptions, PLAN_FILE, STATUS_FILE};
pub use worker_contract::{
    safe_relative_path, UnsafePath, WorkerContractError, WorkerContractRuntime, WorkerInvocation,
    WorkerSettings,
};
