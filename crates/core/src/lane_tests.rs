// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::time_fmt::format_rfc3339;
use chrono::Duration;

fn lock_at(acquired_at: String) -> LaneLock {
    LaneLock {
        lane_id: "lane_1".into(),
        step_id: "s1".into(),
        attempt: 1,
        process_id: 42,
        acquired_at,
    }
}

#[yare::parameterized(
    fresh        = { 10,  300, false },
    at_boundary  = { 300, 300, false },
    ten_minutes  = { 600, 300, true },
)]
fn staleness(age_s: i64, stale_after_s: u64, stale: bool) {
    let now = DateTime::<Utc>::from_timestamp(1_769_760_849, 0).unwrap();
    let lock = lock_at(format_rfc3339(now - Duration::seconds(age_s)));
    assert_eq!(lock.is_stale(now, stale_after_s), stale);
}

#[test]
fn unreadable_timestamp_is_stale() {
    let lock = lock_at("not a time".into());
    assert!(lock.age_s(Utc::now()).is_none());
    assert!(lock.is_stale(Utc::now(), 300));
}

#[test]
fn lane_state_display() {
    assert_eq!(LaneRunState::Degraded.to_string(), "degraded");
    let json = serde_json::to_string(&LaneRunState::Completed).unwrap();
    assert_eq!(json, "\"completed\"");
}
