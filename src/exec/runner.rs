// src/exec/runner.rs

//! Pluggable command runner.
//!
//! Probes and apply actions never spawn processes themselves; they hand a
//! [`CommandSpec`] to a [`CommandRunner`]. Every process-level failure is
//! turned into a [`CommandError`] value, so nothing panics or unwinds past
//! this boundary.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// A single shell command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Interpreter used to run `line` (`<shell> -c <line>`).
    pub shell: String,
    pub line: String,
    /// Kill the process and report [`CommandError::TimedOut`] after this long.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(shell: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            line: line.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to spawn `{line}`: {source}")]
    Spawn {
        line: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{line}` timed out after {after:?}")]
    TimedOut { line: String, after: Duration },

    #[error("failed waiting for `{line}`: {source}")]
    Wait {
        line: String,
        #[source]
        source: std::io::Error,
    },
}

pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, CommandError>> + Send + 'a>>;

/// Trait abstracting how external commands are executed.
///
/// Production code uses [`ShellCommandRunner`]; tests provide an
/// implementation that records invocations and returns canned output.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> CommandFuture<'a>;
}

/// Real runner: spawns `<shell> -c <line>` with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner;

impl CommandRunner for ShellCommandRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> CommandFuture<'a> {
        Box::pin(async move {
            debug!(shell = %spec.shell, cmd = %spec.line, "spawning command");

            let mut cmd = Command::new(&spec.shell);
            cmd.arg("-c")
                .arg(&spec.line)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            // Own process group: a terminal Ctrl-C reaches converge only,
            // and the in-flight command runs to completion.
            #[cfg(unix)]
            cmd.process_group(0);

            let child = cmd.spawn().map_err(|source| CommandError::Spawn {
                line: spec.line.clone(),
                source,
            })?;

            // Dropping the wait future on timeout drops the child, which
            // kills it (kill_on_drop).
            let wait = child.wait_with_output();
            let waited = match spec.timeout {
                Some(limit) => match tokio::time::timeout(limit, wait).await {
                    Ok(res) => res,
                    Err(_) => {
                        info!(cmd = %spec.line, ?limit, "command timed out; killed");
                        return Err(CommandError::TimedOut {
                            line: spec.line.clone(),
                            after: limit,
                        });
                    }
                },
                None => wait.await,
            };

            let output = waited.map_err(|source| CommandError::Wait {
                line: spec.line.clone(),
                source,
            })?;

            let result = CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };

            for line in result.stderr.lines() {
                debug!(cmd = %spec.line, "stderr: {}", line);
            }
            debug!(cmd = %spec.line, exit_code = ?result.code, "command exited");

            Ok(result)
        })
    }
}
