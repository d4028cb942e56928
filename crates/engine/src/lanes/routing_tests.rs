// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::BTreeMap;

fn health(targets: &[(&str, bool)]) -> HealthSummary {
    HealthSummary {
        usable: true,
        targets: targets.iter().map(|(n, h)| (n.to_string(), *h)).collect::<BTreeMap<_, _>>(),
        ..HealthSummary::default()
    }
}

#[yare::parameterized(
    step_wins = { Some("a"), Some("b"), "a" },
    lane_when_step_blank = { Some("  "), Some("b"), "b" },
    active_when_both_missing = { None, None, "global" },
)]
fn precedence_without_health(step: Option<&str>, lane: Option<&str>, expected: &str) {
    let decision = resolve(step, lane, "global", &[], None);
    assert_eq!(decision.target, expected);
    assert_eq!(decision.reroute_reason, None);
}

#[test]
fn healthy_target_is_kept() {
    let h = health(&[("a", true), ("b", true)]);
    let decision = resolve(Some("a"), Some("b"), "global", &[], Some(&h));
    assert_eq!(decision, RouteDecision::keep("a"));
}

#[test]
fn unhealthy_target_reroutes_to_lane_target_first() {
    let h = health(&[("a", false), ("b", true), ("c", true)]);
    let enabled = vec!["c".to_string()];
    let decision = resolve(Some("a"), Some("b"), "global", &enabled, Some(&h));
    assert_eq!(decision.target, "b");
    assert_eq!(decision.reroute_reason.as_deref(), Some("unhealthy_target:a"));
}

#[test]
fn enabled_targets_come_before_snapshot_targets() {
    let h = health(&[("a", false), ("b", true), ("z", true)]);
    let enabled = vec!["z".to_string()];
    let decision = resolve(Some("a"), None, "global", &enabled, Some(&h));
    assert_eq!(decision.target, "z");
}

#[test]
fn snapshot_targets_are_the_last_resort() {
    let h = health(&[("a", false), ("b", true)]);
    let decision = resolve(Some("a"), None, "global", &["a".to_string()], Some(&h));
    assert_eq!(decision.target, "b");
}

#[test]
fn no_healthy_candidate_keeps_original_and_flags() {
    let h = health(&[("a", false), ("b", false)]);
    let decision = resolve(Some("a"), Some("b"), "global", &[], Some(&h));
    assert_eq!(decision.target, "a");
    assert_eq!(decision.reroute_reason, None);
    assert!(decision.unresolved_unhealthy);
}

#[test]
fn unknown_target_counts_as_unhealthy() {
    let h = health(&[("b", true)]);
    let decision = resolve(Some("mystery"), None, "global", &[], Some(&h));
    assert_eq!(decision.target, "b");
    assert_eq!(decision.reroute_reason.as_deref(), Some("unhealthy_target:mystery"));
}

#[test]
fn never_reroutes_to_the_unhealthy_target() {
    let h = health(&[("a", false), ("b", true)]);
    let decision = resolve(Some("a"), Some("a"), "a", &["a".to_string()], Some(&h));
    assert_ne!(decision.target, "a");
}
