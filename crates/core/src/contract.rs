// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker contract request/response documents.
//!
//! The request is written before delegating a `worker_contract` step; the
//! adapter answers with a response document in the same directory.

use crate::plan::Step;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const CONTRACT_VERSION: u32 = 1;

pub const REQUEST_FILE: &str = "request.json";
pub const RESPONSE_FILE: &str = "response.json";
pub const NOTES_FILE: &str = "notes.md";
pub const DIFF_FILE: &str = "diff.patch";
pub const COMMAND_LOG_FILE: &str = "command.log";

/// Full execution context handed to an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub contract_version: u32,
    pub created_at: String,
    pub job_dir: String,
    pub step_id: String,
    pub attempt: u32,
    pub lane_id: String,
    pub target: String,
    pub step: Step,
}

/// Adapter answer. Only `status` is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_text: Option<String>,
    /// Relative path to file content, materialized under the job directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_files: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes_md: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_patch: Option<String>,
    /// Adapter-specific metadata, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkerResponse {
    /// `ok` or `success`, case-insensitive.
    pub fn is_success(&self) -> bool {
        let status = self.status.trim();
        status.eq_ignore_ascii_case("ok") || status.eq_ignore_ascii_case("success")
    }

    /// Error text for a non-success response.
    pub fn failure_message(&self) -> String {
        match self.error.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            Some(error) => error.to_string(),
            None => format!("worker reported status '{}'", self.status),
        }
    }
}

#[cfg(test)]
#[path = "contract_tests.rs"]
mod tests;
