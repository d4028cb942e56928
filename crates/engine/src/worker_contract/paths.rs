// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Containment check for paths supplied by a worker.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsafe output path {path:?}: {reason}")]
pub struct UnsafePath {
    pub path: String,
    pub reason: &'static str,
}

/// Normalize a worker-supplied relative path.
///
/// `.` segments are dropped and `..` pops a preceding segment. Absolute
/// paths, paths whose normal form starts with `..`, and paths that
/// normalize to nothing are rejected.
pub fn safe_relative_path(raw: &str) -> Result<PathBuf, UnsafePath> {
    let reject = |reason| UnsafePath { path: raw.to_string(), reason };
    if raw.trim().is_empty() {
        return Err(reject("empty path"));
    }
    if raw.contains('\0') {
        return Err(reject("contains NUL"));
    }
    let path = Path::new(raw);
    if path.is_absolute() || raw.starts_with('/') || raw.starts_with('\\') {
        return Err(reject("absolute path"));
    }

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(reject("escapes the job directory"));
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(reject("absolute path")),
        }
    }
    if parts.is_empty() {
        return Err(reject("names no file"));
    }
    Ok(parts.into_iter().collect())
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
