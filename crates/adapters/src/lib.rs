// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! relay-adapters: collaborator contracts and their built-in implementations

pub mod capture;
pub mod dispatcher;
mod error;
pub mod plan_builder;
pub mod scheduler;
pub mod sequencer;
pub mod subprocess;
pub mod template;
pub mod validator;

pub use capture::{CaptureOutcome, CaptureRequest, CaptureRuntime, NoopCapture};
pub use dispatcher::{LaneDispatcher, TargetPartitionDispatcher};
pub use error::AdapterError;
pub use plan_builder::{CommandPlanBuilder, PlanBuilder, PlanRequest};
pub use scheduler::{ActiveTargetScheduler, TargetAssignment, TargetScheduler};
pub use sequencer::{CommandSequencer, Sequencer};
pub use validator::{OutputFileValidator, StepValidator};

#[cfg(any(test, feature = "test-support"))]
pub use capture::FakeCapture;
#[cfg(any(test, feature = "test-support"))]
pub use dispatcher::StaticDispatcher;
#[cfg(any(test, feature = "test-support"))]
pub use plan_builder::FakePlanBuilder;
#[cfg(any(test, feature = "test-support"))]
pub use sequencer::{FakeSequencer, SendCall};
#[cfg(any(test, feature = "test-support"))]
pub use validator::FakeValidator;
