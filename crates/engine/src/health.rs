// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health Snapshot Loader.
//!
//! Reads the externally produced target health document and decides whether
//! it is fresh enough to route on. Every problem degrades to an unusable
//! summary; loading never fails the run.

use crate::config::HealthConfig;
use relay_core::time_fmt::{format_rfc3339, seconds_between};
use relay_core::{Clock, HealthSnapshot, HealthSummary};
use std::path::Path;

/// Load the configured snapshot and summarize it.
pub fn load_health_snapshot<C: Clock>(config: &HealthConfig, clock: &C) -> HealthSummary {
    let Some(path) = config.resolved_snapshot_path() else {
        return unusable("", config.max_age_s, "no snapshot path");
    };
    if !config.enabled {
        return unusable(&path.display().to_string(), config.max_age_s, "disabled");
    }
    summarize_snapshot_file(&path, config.max_age_s, clock)
}

/// Summarize the snapshot at `path`.
///
/// Usable only if `now - checked_at <= max_age_s` and at least one target is healthy.
pub fn summarize_snapshot_file<C: Clock>(path: &Path, max_age_s: u64, clock: &C) -> HealthSummary {
    let shown = path.display().to_string();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return unusable(&shown, max_age_s, "missing");
        }
        Err(e) => return unusable(&shown, max_age_s, &format!("unreadable: {e}")),
    };
    let snapshot: HealthSnapshot = match serde_json::from_str(&raw) {
        Ok(snapshot) => snapshot,
        Err(e) => return unusable(&shown, max_age_s, &format!("invalid: {e}")),
    };
    summarize(&shown, snapshot, max_age_s, clock)
}

fn summarize<C: Clock>(
    path: &str,
    snapshot: HealthSnapshot,
    max_age_s: u64,
    clock: &C,
) -> HealthSummary {
    let targets = snapshot
        .targets
        .iter()
        .map(|(name, health)| (name.clone(), health.is_healthy()))
        .collect();
    let mut summary = HealthSummary {
        path: path.to_string(),
        usable: false,
        reason: None,
        checked_at: None,
        age_s: None,
        max_age_s,
        targets,
    };

    let Some(checked_at) = snapshot.checked_at.as_ref().and_then(|c| c.to_utc()) else {
        summary.reason = Some("missing or unparseable checked_at".into());
        return summary;
    };
    let age_s = seconds_between(checked_at, clock.now());
    summary.checked_at = Some(format_rfc3339(checked_at));
    summary.age_s = Some(age_s);

    if age_s > max_age_s as f64 {
        summary.reason = Some(format!("stale: {age_s:.0}s old, max {max_age_s}s"));
    } else if summary.healthy_targets().next().is_none() {
        summary.reason = Some("no healthy targets".into());
    } else {
        summary.usable = true;
    }
    summary
}

fn unusable(path: &str, max_age_s: u64, reason: &str) -> HealthSummary {
    HealthSummary {
        path: path.to_string(),
        usable: false,
        reason: Some(reason.to_string()),
        max_age_s,
        ..HealthSummary::default()
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
