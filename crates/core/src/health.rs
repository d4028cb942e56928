// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target health snapshot documents.
//!
//! The snapshot is authored by an external probe; this module only models
//! its shape and the summary the runner derives from it.

use crate::time_fmt::{from_epoch_secs, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `checked_at` as found on disk: epoch seconds or a timestamp string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckedAt {
    Epoch(f64),
    Text(String),
}

impl CheckedAt {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            CheckedAt::Epoch(secs) => from_epoch_secs(*secs),
            CheckedAt::Text(raw) => parse_timestamp(raw),
        }
    }
}

/// Per-target entry: a bare flag or an object with a `healthy` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetHealth {
    Flag(bool),
    Detail {
        #[serde(default)]
        healthy: bool,
    },
}

impl TargetHealth {
    pub fn is_healthy(&self) -> bool {
        match self {
            TargetHealth::Flag(healthy) | TargetHealth::Detail { healthy } => *healthy,
        }
    }
}

/// Raw snapshot document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    #[serde(default)]
    pub checked_at: Option<CheckedAt>,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetHealth>,
}

/// What the runner learned from the snapshot, recorded in status documents.
///
/// Only a `usable` summary is consulted for routing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub path: String,
    pub usable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_s: Option<f64>,
    pub max_age_s: u64,
    #[serde(default)]
    pub targets: BTreeMap<String, bool>,
}

impl HealthSummary {
    pub fn is_healthy(&self, target: &str) -> bool {
        self.targets.get(target).copied().unwrap_or(false)
    }

    pub fn healthy_targets(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().filter(|(_, healthy)| **healthy).map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
