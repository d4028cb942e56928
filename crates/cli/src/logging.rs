// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Diagnostic logging to stderr.
//!
//! The per-job `log.txt` is written by the engine; this only routes
//! `tracing` events for the operator's terminal.

use tracing_subscriber::EnvFilter;

/// Env vars consulted for a filter directive, highest priority first.
const FILTER_VARS: [&str; 2] = ["RELAY_LOG", "RUST_LOG"];

/// First non-blank filter directive among [`FILTER_VARS`], else `default`.
pub fn filter_directive(lookup: impl Fn(&str) -> Option<String>, default: &str) -> String {
    FILTER_VARS
        .iter()
        .filter_map(|&name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let directive = filter_directive(|name| std::env::var(name).ok(), default);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
