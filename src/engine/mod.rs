// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`orchestrator`] walks the task graph in order and runs the
//!   probe / apply / verify cycle for each task.
//! - [`runlog`] is the append-only, flushed audit trail of a run.
//! - [`report`] turns a finished [`RunRecord`] into counts and an exit code.
//! - [`cancel`] and [`confirm`] are the two collaborators the orchestrator
//!   consults between tasks and before applying.

use std::fmt;

use crate::task::{ApplyError, ProbeStatus, TaskName};

/// Why a task was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The probe reported the desired state already holds.
    Satisfied,
    /// The operator declined the task's confirmation prompt.
    Declined,
}

/// Why a task failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    Apply(ApplyError),
    /// Apply reported success but the re-probe disagrees.
    VerificationFailed(ProbeStatus),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Apply(err) => write!(f, "{err}"),
            FailureCause::VerificationFailed(status) => {
                write!(f, "apply succeeded but state did not converge (probe: {status})")
            }
        }
    }
}

/// Why a task never ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    DependencyFailed(TaskName),
    /// A fatal failure (or fatally blocked task) ended the run.
    RunAborted { by: TaskName },
    Cancelled,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::DependencyFailed(dep) => write!(f, "dependency '{dep}' did not succeed"),
            BlockReason::RunAborted { by } => write!(f, "run aborted by fatal task '{by}'"),
            BlockReason::Cancelled => f.write_str("run cancelled before this task started"),
        }
    }
}

/// Final outcome of a task. Every task in the graph gets exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Skipped(SkipReason),
    /// Ran and converged.
    Applied,
    Failed(FailureCause),
    Blocked(BlockReason),
    /// Dry-run only: the probe says the task would be applied.
    Planned,
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Skipped(_) => "skipped",
            TaskOutcome::Applied => "applied",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Blocked(_) => "blocked",
            TaskOutcome::Planned => "planned",
        }
    }

    /// Failed or blocked: dependents of this task cannot run.
    pub fn is_unsuccessful(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_) | TaskOutcome::Blocked(_))
    }
}

/// Global state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Executing,
    Completed,
    Aborted,
}

/// Per-invocation switches from the CLI and `[config]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestratorOptions {
    /// Probe and report only; never apply.
    pub dry_run: bool,
    /// Treat every task as `Degraded` for this run.
    pub force_degraded: bool,
    /// Apply timeout for tasks that do not set their own.
    pub default_timeout: Option<std::time::Duration>,
}

pub mod cancel;
pub mod confirm;
pub mod orchestrator;
pub mod report;
pub mod runlog;

pub use cancel::CancelToken;
pub use confirm::{AutoConfirm, Confirmer, StdinConfirmer};
pub use orchestrator::Orchestrator;
pub use report::{render, RunSummary, EXIT_ABORTED, EXIT_CONFIG_ERROR, EXIT_DEGRADED, EXIT_SUCCESS};
pub use runlog::{RunEvent, RunLog, RunRecord};
