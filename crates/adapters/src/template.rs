// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `${name}` placeholder interpolation for command templates.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Matches `${name}` where name is an identifier, optionally dotted.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_-]*)*)\}")
        .expect("constant regex pattern is valid")
});

/// Escape a value for use inside a double-quoted shell string.
///
/// Backslash, `$`, backtick and `"` are backslash-escaped; everything else
/// (including single quotes and newlines) passes through.
pub fn escape_for_shell(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '\\' | '$' | '`' | '"') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Substitute `${name}` placeholders. Unknown placeholders are left as-is.
pub fn interpolate(template: &str, vars: &BTreeMap<String, String>) -> String {
    interpolate_inner(template, vars, false)
}

/// Like [`interpolate`], escaping substituted values with [`escape_for_shell`].
pub fn interpolate_shell(template: &str, vars: &BTreeMap<String, String>) -> String {
    interpolate_inner(template, vars, true)
}

fn interpolate_inner(template: &str, vars: &BTreeMap<String, String>, shell_escape: bool) -> String {
    VAR_PATTERN
        .replace_all(template, |caps: &regex::Captures| match vars.get(&caps[1]) {
            Some(val) if shell_escape => escape_for_shell(val),
            Some(val) => val.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
