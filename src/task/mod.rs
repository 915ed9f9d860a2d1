// src/task/mod.rs

//! The atomic unit of provisioning.
//!
//! A [`Task`] pairs a read-only [`StateProbe`] with a mutating
//! [`ApplyAction`]. Tasks are plain data; the orchestrator decides when
//! each half runs.

pub mod apply;
pub mod probe;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::{CommandRunner, TargetInfo};
use crate::fs::FileSystem;
use crate::types::{FailurePolicy, PackageManager, ShellKind};

pub use apply::{ApplyAction, ApplyError, ApplyErrorKind, RetryPolicy, ShellSteps};
pub use probe::{Probe, ProbeStatus, StateProbe};

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Collaborators shared by every probe and apply action in a run.
#[derive(Clone)]
pub struct TaskContext {
    pub runner: Arc<dyn CommandRunner>,
    pub fs: Arc<dyn FileSystem>,
    pub target: TargetInfo,
    /// Interpreter for command strings (`<shell> -c <cmd>`).
    pub shell: String,
    /// Upper bound for probe commands.
    pub probe_timeout: Option<Duration>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("fs", &self.fs)
            .field("target", &self.target)
            .field("shell", &self.shell)
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

/// Restricts a task to matching targets. Empty lists match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TargetFilter {
    #[serde(default)]
    pub os: Vec<String>,
    #[serde(default)]
    pub package_manager: Vec<PackageManager>,
    #[serde(default)]
    pub shell: Vec<ShellKind>,
}

impl TargetFilter {
    pub fn matches(&self, target: &TargetInfo) -> bool {
        let os_ok = self.os.is_empty() || self.os.iter().any(|os| os == &target.os);
        let pm_ok = self.package_manager.is_empty()
            || target
                .package_manager
                .is_some_and(|pm| self.package_manager.contains(&pm));
        let shell_ok = self.shell.is_empty()
            || target.shell.is_some_and(|sh| self.shell.contains(&sh));
        os_ok && pm_ok && shell_ok
    }

    pub fn is_unrestricted(&self) -> bool {
        self.os.is_empty() && self.package_manager.is_empty() && self.shell.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub name: TaskName,
    pub description: Option<String>,
    pub probe: Arc<dyn StateProbe>,
    pub apply: Arc<dyn ApplyAction>,
    /// Tasks that must finish without failing before this one may run.
    pub deps: Vec<TaskName>,
    pub policy: FailurePolicy,
    /// Re-probe after a successful apply and fail on non-convergence.
    pub verify: bool,
    /// Limit on one apply attempt; exceeding it is an `ApplyErrorKind::Timeout`.
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
    /// Question to confirm with the operator before applying.
    pub confirm: Option<String>,
    pub only_on: TargetFilter,
}

impl Task {
    pub fn new(
        name: impl Into<TaskName>,
        probe: Arc<dyn StateProbe>,
        apply: Arc<dyn ApplyAction>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            probe,
            apply,
            deps: Vec::new(),
            policy: FailurePolicy::default(),
            verify: true,
            timeout: None,
            retry: RetryPolicy::default(),
            confirm: None,
            only_on: TargetFilter::default(),
        }
    }

    pub fn after(mut self, dep: impl Into<TaskName>) -> Self {
        self.deps.push(dep.into());
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn confirm(mut self, prompt: impl Into<String>) -> Self {
        self.confirm = Some(prompt.into());
        self
    }

    pub fn only_on(mut self, filter: TargetFilter) -> Self {
        self.only_on = filter;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
