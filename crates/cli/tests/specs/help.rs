// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI help output specs

use crate::prelude::*;

#[test]
fn help_lists_subcommands() {
    cli().args(&["--help"]).passes().stdout_has("Usage:").stdout_has("run").stdout_has("status");
}

#[test]
fn run_help_lists_flags() {
    cli()
        .args(&["run", "--help"])
        .passes()
        .stdout_has("--config")
        .stdout_has("--target")
        .stdout_has("--max-lanes")
        .stdout_has("--force-plan");
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    cli().args(&["launch"]).exits_with(2).stderr_has("Usage:");
}
