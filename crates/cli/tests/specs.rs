// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Behavioral specs for the `relay` binary.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/help.rs"]
mod help;
#[path = "specs/run.rs"]
mod run;
#[path = "specs/status.rs"]
mod status;
