// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target resolution and health-aware rerouting.

use relay_core::HealthSummary;
use serde::Serialize;

/// Target chosen for an attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    pub target: String,
    /// `unhealthy_target:<original>` when the attempt was rerouted.
    pub reroute_reason: Option<String>,
    /// The target is unhealthy and no healthy fallback exists.
    #[serde(skip)]
    pub unresolved_unhealthy: bool,
}

impl RouteDecision {
    fn keep(target: &str) -> Self {
        Self { target: target.to_string(), reroute_reason: None, unresolved_unhealthy: false }
    }
}

/// Resolve the attempt target.
///
/// The step's own target wins, then the lane's, then the global active
/// target. With a usable snapshot, an unhealthy target is swapped for the
/// first healthy candidate among the lane target, the enabled targets and
/// the snapshot's targets. Without a healthy candidate the original target
/// is returned and flagged.
pub(crate) fn resolve(
    step_target: Option<&str>,
    lane_target: Option<&str>,
    active_target: &str,
    enabled_targets: &[String],
    health: Option<&HealthSummary>,
) -> RouteDecision {
    fn non_blank(t: Option<&str>) -> Option<&str> {
        t.map(str::trim).filter(|t| !t.is_empty())
    }
    let target = non_blank(step_target)
        .or_else(|| non_blank(lane_target))
        .unwrap_or_else(|| active_target.trim());

    let Some(health) = health else {
        return RouteDecision::keep(target);
    };
    if health.is_healthy(target) {
        return RouteDecision::keep(target);
    }

    let candidates = non_blank(lane_target)
        .into_iter()
        .chain(enabled_targets.iter().map(|t| t.trim()))
        .chain(health.targets.keys().map(String::as_str));
    for candidate in candidates {
        if candidate != target && health.is_healthy(candidate) {
            return RouteDecision {
                target: candidate.to_string(),
                reroute_reason: Some(format!("unhealthy_target:{target}")),
                unresolved_unhealthy: false,
            };
        }
    }
    RouteDecision { unresolved_unhealthy: true, ..RouteDecision::keep(target) }
}

#[cfg(test)]
#[path = "routing_tests.rs"]
mod tests;
