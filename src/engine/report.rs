// src/engine/report.rs

//! End-of-run summary and exit-code mapping.

use std::fmt::Write as _;

use crate::engine::runlog::RunRecord;
use crate::engine::{RunState, SkipReason, TaskOutcome};

pub const EXIT_SUCCESS: i32 = 0;
/// Completed, but at least one task failed or was blocked.
pub const EXIT_DEGRADED: i32 = 1;
/// Stopped early on a fatal failure or cancellation.
pub const EXIT_ABORTED: i32 = 2;
/// Cycle, unknown task reference, or otherwise invalid configuration.
pub const EXIT_CONFIG_ERROR: i32 = 3;

/// Outcome counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub skipped: usize,
    /// Subset of `skipped` where the operator declined.
    pub declined: usize,
    pub applied: usize,
    pub failed: usize,
    pub blocked: usize,
    pub planned: usize,
    pub aborted: bool,
}

impl RunSummary {
    pub fn from_record(record: &RunRecord) -> Self {
        let mut summary = RunSummary {
            aborted: record.state == RunState::Aborted,
            ..Default::default()
        };
        for (_, outcome) in &record.outcomes {
            match outcome {
                TaskOutcome::Skipped(reason) => {
                    summary.skipped += 1;
                    if *reason == SkipReason::Declined {
                        summary.declined += 1;
                    }
                }
                TaskOutcome::Applied => summary.applied += 1,
                TaskOutcome::Failed(_) => summary.failed += 1,
                TaskOutcome::Blocked(_) => summary.blocked += 1,
                TaskOutcome::Planned => summary.planned += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.skipped + self.applied + self.failed + self.blocked + self.planned
    }

    pub fn exit_code(&self) -> i32 {
        if self.aborted {
            EXIT_ABORTED
        } else if self.failed > 0 || self.blocked > 0 {
            EXIT_DEGRADED
        } else {
            EXIT_SUCCESS
        }
    }
}

/// Human-readable summary: one count line, then every failed or blocked
/// task with its proximate cause.
pub fn render(record: &RunRecord) -> String {
    let summary = RunSummary::from_record(record);
    let mut out = String::new();

    let header = if record.dry_run { "converge dry-run" } else { "converge" };
    let status = match (record.state, summary.exit_code()) {
        (RunState::Aborted, _) => "aborted",
        (_, EXIT_SUCCESS) => "ok",
        _ => "completed with failures",
    };
    let _ = writeln!(out, "{header}: {status}");

    if record.dry_run {
        let _ = writeln!(
            out,
            "  {} total: {} would apply, {} already satisfied, {} blocked",
            summary.total(),
            summary.planned,
            summary.skipped,
            summary.blocked
        );
    } else {
        let _ = writeln!(
            out,
            "  {} total: {} applied, {} skipped, {} failed, {} blocked",
            summary.total(),
            summary.applied,
            summary.skipped,
            summary.failed,
            summary.blocked
        );
    }

    for (name, outcome) in &record.outcomes {
        match outcome {
            TaskOutcome::Failed(cause) => {
                let _ = writeln!(out, "  FAILED  {name}: {cause}");
            }
            TaskOutcome::Blocked(reason) => {
                let _ = writeln!(out, "  BLOCKED {name}: {reason}");
            }
            TaskOutcome::Planned => {
                let _ = writeln!(out, "  PLAN    {name}");
            }
            TaskOutcome::Skipped(SkipReason::Declined) => {
                let _ = writeln!(out, "  DECLINED {name}");
            }
            _ => {}
        }
    }

    if let Some(path) = &record.log_path {
        let _ = writeln!(out, "  run log: {}", path.display());
        if record.log_write_failures > 0 {
            let _ = writeln!(
                out,
                "  WARNING {} run log entries could not be written; the file is incomplete",
                record.log_write_failures
            );
        }
    }
    out
}
