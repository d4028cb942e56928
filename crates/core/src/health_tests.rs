// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn target_entries_accept_both_shapes() {
    let snapshot: HealthSnapshot = serde_json::from_str(
        r#"{
            "checked_at": "2026-01-30T08:14:09Z",
            "targets": {
                "codex": true,
                "claude": {"healthy": false, "latency_ms": 40},
                "cursor": {"healthy": true},
                "gemini": {}
            }
        }"#,
    )
    .unwrap();
    let healthy: Vec<(&str, bool)> = snapshot
        .targets
        .iter()
        .map(|(name, h)| (name.as_str(), h.is_healthy()))
        .collect();
    assert_eq!(
        healthy,
        vec![("claude", false), ("codex", true), ("cursor", true), ("gemini", false)]
    );
}

#[test]
fn checked_at_accepts_epoch_seconds() {
    let snapshot: HealthSnapshot =
        serde_json::from_str(r#"{"checked_at": 1769760849, "targets": {}}"#).unwrap();
    let at = snapshot.checked_at.unwrap().to_utc().unwrap();
    assert_eq!(at.timestamp(), 1_769_760_849);
}

#[test]
fn summary_lookups() {
    let summary = HealthSummary {
        usable: true,
        targets: [("a".to_string(), true), ("b".to_string(), false)].into(),
        ..HealthSummary::default()
    };
    assert!(summary.is_healthy("a"));
    assert!(!summary.is_healthy("b"));
    assert!(!summary.is_healthy("unknown"));
    assert_eq!(summary.healthy_targets().collect::<Vec<_>>(), vec!["a"]);
}
