// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! relay-core: data model for the relay plan runner

pub mod macros;

pub mod clock;
pub mod contract;
pub mod dispatch;
pub mod health;
pub mod lane;
pub mod plan;
pub mod status;
pub mod time_fmt;

pub use clock::{Clock, FakeClock, SystemClock};
pub use contract::{WorkerRequest, WorkerResponse, CONTRACT_VERSION};
pub use dispatch::{DispatchPlan, ExecutionMode, LaneSpec, DEFAULT_LANE_ID, SINGLE_LANE_TARGET};
pub use health::{HealthSnapshot, HealthSummary, TargetHealth};
pub use lane::{LaneLock, LaneManifest, LaneMetrics, LaneRunState, LaneStatus};
#[cfg(any(test, feature = "test-support"))]
pub use plan::StepBuilder;
pub use plan::{CaptureOptions, Plan, PlanError, Step, StepKind, WorkerSpec, DEFAULT_MAX_RETRIES};
pub use status::{JobState, JobStatus, StepRunState, StepState};
