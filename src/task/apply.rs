// src/task/apply.rs

//! Apply actions and their typed failures.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::exec::{CommandError, CommandOutput, CommandSpec};
use crate::task::TaskContext;

/// Why an apply action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyErrorKind {
    Network,
    Permission,
    /// Missing capability, bad command, or anything not otherwise classified.
    Structural,
    Timeout,
}

impl ApplyErrorKind {
    /// Only transient kinds are ever retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, ApplyErrorKind::Network | ApplyErrorKind::Timeout)
    }
}

impl fmt::Display for ApplyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyErrorKind::Network => "network",
            ApplyErrorKind::Permission => "permission",
            ApplyErrorKind::Structural => "structural",
            ApplyErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct ApplyError {
    pub kind: ApplyErrorKind,
    pub message: String,
}

impl ApplyError {
    pub fn new(kind: ApplyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(ApplyErrorKind::Timeout, format!("apply exceeded {after:?}"))
    }
}

impl From<CommandError> for ApplyError {
    fn from(err: CommandError) -> Self {
        let kind = match err {
            CommandError::TimedOut { .. } => ApplyErrorKind::Timeout,
            CommandError::Spawn { ref source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                ApplyErrorKind::Permission
            }
            CommandError::Spawn { .. } | CommandError::Wait { .. } => ApplyErrorKind::Structural,
        };
        ApplyError::new(kind, err.to_string())
    }
}

const PERMISSION_MARKERS: &[&str] = &[
    "permission denied",
    "operation not permitted",
    "are you root",
    "a password is required",
    "is not in the sudoers file",
];

const NETWORK_MARKERS: &[&str] = &[
    "could not resolve host",
    "temporary failure in name resolution",
    "name or service not known",
    "connection refused",
    "connection reset",
    "connection timed out",
    "network is unreachable",
    "failed to connect",
    "ssl_connect",
    "tls handshake",
    "failed to fetch",
    "unable to access",
    "the requested url returned error",
];

/// Classify a non-zero exit into an [`ApplyErrorKind`].
pub fn classify_failure(output: &CommandOutput) -> ApplyErrorKind {
    match output.code {
        Some(126) => return ApplyErrorKind::Permission,
        Some(127) => return ApplyErrorKind::Structural,
        _ => {}
    }

    let stderr = output.stderr.to_lowercase();
    if PERMISSION_MARKERS.iter().any(|m| stderr.contains(m)) {
        ApplyErrorKind::Permission
    } else if NETWORK_MARKERS.iter().any(|m| stderr.contains(m)) {
        ApplyErrorKind::Network
    } else {
        ApplyErrorKind::Structural
    }
}

pub type ApplyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ApplyError>> + Send + 'a>>;

/// The mutating half of a task.
///
/// Implementations are not assumed idempotent; the orchestrator only calls
/// `apply` after the probe reported the state as missing.
pub trait ApplyAction: Send + Sync + fmt::Debug {
    fn apply<'a>(&'a self, ctx: &'a TaskContext) -> ApplyFuture<'a>;
}

/// Ordered list of shell command lines; stops at the first failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSteps {
    pub steps: Vec<String>,
}

impl ShellSteps {
    pub fn new(steps: Vec<String>) -> Self {
        Self { steps }
    }
}

impl ApplyAction for ShellSteps {
    fn apply<'a>(&'a self, ctx: &'a TaskContext) -> ApplyFuture<'a> {
        Box::pin(async move {
            let total = self.steps.len();
            for (idx, line) in self.steps.iter().enumerate() {
                info!(step = idx + 1, total, cmd = %line, "running apply step");
                let spec = CommandSpec::new(&ctx.shell, line.as_str());
                let output = ctx.runner.run(&spec).await?;
                if !output.success() {
                    let kind = classify_failure(&output);
                    let detail = output.stderr.lines().last().unwrap_or("").trim();
                    let code = output
                        .code
                        .map_or_else(|| "signal".to_string(), |c| c.to_string());
                    return Err(ApplyError::new(
                        kind,
                        format!("step {}/{} `{}` exited with {}: {}", idx + 1, total, line, code, detail),
                    ));
                }
                debug!(step = idx + 1, total, "apply step succeeded");
            }
            Ok(())
        })
    }
}

/// How often a transiently failing apply is re-attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// `attempt` is 1-based: the attempt that just failed.
    pub fn should_retry(&self, err: &ApplyError, attempt: u32) -> bool {
        err.kind.is_retryable() && attempt <= self.retries
    }
}
