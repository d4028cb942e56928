// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine crate.

use std::path::PathBuf;

/// Resolve state directory: RELAY_STATE_DIR > XDG_STATE_HOME/relay > ~/.local/state/relay
pub fn state_dir() -> Option<PathBuf> {
    if let Some(dir) = non_empty_var("RELAY_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Some(xdg) = non_empty_var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("relay"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/relay"))
}

/// Config file named by `RELAY_CONFIG`, if set.
pub fn config_override() -> Option<PathBuf> {
    non_empty_var("RELAY_CONFIG").map(PathBuf::from)
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
