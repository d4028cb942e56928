// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::ValueEnum;
use relay_core::{JobState, JobStatus, LaneStatus, StepRunState};
use relay_engine::{persist, LANE_SUMMARY_FILE, STATUS_FILE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::color;

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// The parts of `lane_summary.json` the report shows; other keys pass through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaneSummaryView {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub state: JobState,
    #[serde(default)]
    pub duration_s: f64,
    #[serde(default)]
    pub lanes: Vec<LaneStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Persisted state of one job directory.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_dir: PathBuf,
    pub status: JobStatus,
    pub lane_summary: Option<LaneSummaryView>,
}

impl JobReport {
    /// Read `status.json` and `lane_summary.json`. `None` when the job never ran.
    pub fn load(job_dir: &Path) -> anyhow::Result<Option<Self>> {
        let status_path = job_dir.join(STATUS_FILE);
        let Some(status) = persist::read_json::<JobStatus>(&status_path)
            .with_context(|| format!("failed to read {}", status_path.display()))?
        else {
            return Ok(None);
        };
        let summary_path = job_dir.join(LANE_SUMMARY_FILE);
        let lane_summary = persist::read_json::<LaneSummaryView>(&summary_path)
            .with_context(|| format!("failed to read {}", summary_path.display()))?;
        Ok(Some(Self { job_dir: job_dir.to_path_buf(), status, lane_summary }))
    }
}

pub fn print_report(report: &JobReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => print!("{}", format_report(report)),
    }
    Ok(())
}

/// Render a report as aligned text.
pub fn format_report(report: &JobReport) -> String {
    let status = &report.status;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}: {}",
        color::header("job"),
        report.job_dir.display(),
        color::state(&status.state.to_string())
    );

    let mut fields: Vec<(&str, String)> = Vec::new();
    if !status.run_id.is_empty() {
        fields.push(("run", status.run_id.clone()));
    }
    let mode = if status.dispatch_mode.is_empty() {
        status.mode.to_string()
    } else {
        format!("{} ({})", status.mode, status.dispatch_mode)
    };
    fields.push(("mode", mode));
    if let Some(reason) = &status.fallback_reason {
        fields.push(("fallback", reason.clone()));
    }
    if let Some(health) = &status.health {
        let text = if health.usable {
            format!("usable ({})", health.healthy_targets().collect::<Vec<_>>().join(", "))
        } else {
            format!("unusable: {}", health.reason.as_deref().unwrap_or("unknown"))
        };
        fields.push(("health", text));
    }
    if let Some(step) = &status.failed_step {
        fields.push((
            "failed",
            format!(
                "{step} on {}: {}",
                status.failed_lane.as_deref().unwrap_or("?"),
                status.error.as_deref().unwrap_or("unknown error")
            ),
        ));
    }
    for (key, value) in fields {
        let _ = writeln!(out, "  {:<9} {}", key, value);
    }

    if !status.steps.is_empty() {
        let _ = writeln!(out, "\n{}", color::header("steps"));
        let rows: Vec<[String; 5]> = status
            .steps
            .iter()
            .map(|(id, step)| {
                [
                    id.clone(),
                    step.state.to_string(),
                    format!("attempts {}", step.attempts),
                    step.lane_id.clone().unwrap_or_else(|| "-".into()),
                    step.target.clone().unwrap_or_else(|| "-".into()),
                ]
            })
            .collect();
        write_table(&mut out, &rows, 1);
        for (id, step) in &status.steps {
            match &step.last_error {
                Some(error) if step.state != StepRunState::Completed => {
                    let _ = writeln!(out, "  {} {}", color::muted(&format!("{id}:")), error);
                }
                _ => {}
            }
        }
    }

    if let Some(summary) = report.lane_summary.as_ref().filter(|s| !s.lanes.is_empty()) {
        let duration = format!("({:.1}s)", summary.duration_s);
        let _ = writeln!(out, "\n{} {}", color::header("lanes"), color::muted(&duration));
        let rows: Vec<[String; 5]> = summary
            .lanes
            .iter()
            .map(|lane| {
                let m = &lane.metrics;
                [
                    lane.lane_id.clone(),
                    lane.state.to_string(),
                    format!("{}/{} steps", m.steps_completed, m.steps_total),
                    format!("attempts {}", m.attempts_total),
                    format!("retries {} reroutes {}", m.retries_total, m.reroutes_total),
                ]
            })
            .collect();
        write_table(&mut out, &rows, 1);
    }
    out
}

/// Two-space indented columns padded to the widest cell; `state_col` is colored.
fn write_table<const N: usize>(out: &mut String, rows: &[[String; N]], state_col: usize) {
    let mut widths = [0usize; N];
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    for row in rows {
        let mut line = String::new();
        for (col, (cell, width)) in row.iter().zip(widths).enumerate() {
            let padding = " ".repeat(width - cell.len());
            let cell = if col == state_col { color::state(cell) } else { cell.clone() };
            let _ = write!(line, "  {cell}{padding}");
        }
        let _ = writeln!(out, "{}", line.trim_end());
    }
}
