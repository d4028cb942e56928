// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::subprocess::SubprocessError;
use thiserror::Error;

/// Errors surfaced by collaborator implementations.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("{label} exited with code {code}: {stderr}")]
    CommandFailed { label: String, code: i32, stderr: String },
    #[error("completion timed out after {0:.1}s")]
    CompletionTimeout(f64),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failed(String),
}
