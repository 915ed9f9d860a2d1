// src/task/probe.rs

//! State probes: read-only checks of whether a task's end state holds.
//!
//! A probe never mutates the system and never fails outward. A target that
//! is simply absent is `Unsatisfied`; a check that could not be carried out
//! (query command missing, unreadable file) is `Indeterminate`.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use regex::Regex;
use tracing::debug;

use crate::exec::CommandSpec;
use crate::fs::find_on_path;
use crate::task::TaskContext;
use crate::types::PackageManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Satisfied,
    Unsatisfied,
    /// The check itself failed; carries the reason.
    Indeterminate(String),
}

impl ProbeStatus {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ProbeStatus::Satisfied)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProbeStatus::Satisfied => "satisfied",
            ProbeStatus::Unsatisfied => "unsatisfied",
            ProbeStatus::Indeterminate(_) => "indeterminate",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Indeterminate(reason) => write!(f, "indeterminate ({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = ProbeStatus> + Send + 'a>>;

/// Capability: "can this target already be considered installed/configured?"
pub trait StateProbe: Send + Sync + fmt::Debug {
    fn check<'a>(&'a self, ctx: &'a TaskContext) -> ProbeFuture<'a>;

    /// Short human-readable description for logs and dry-run output.
    fn describe(&self) -> String;
}

/// Built-in probe kinds, one per installable flavour.
#[derive(Debug, Clone)]
pub enum Probe {
    /// Executable present on the target's `PATH`.
    Binary { name: String },
    Directory { path: PathBuf },
    File { path: PathBuf },
    /// File exists and contains `text` verbatim.
    FileContains { path: PathBuf, text: String },
    /// File exists and some part of it matches `pattern`.
    FileMatches { path: PathBuf, pattern: Regex },
    /// Package known to the target's package manager as installed.
    Package { name: String },
    /// Arbitrary command: exit 0 means satisfied.
    Command { cmd: String },
}

impl StateProbe for Probe {
    fn check<'a>(&'a self, ctx: &'a TaskContext) -> ProbeFuture<'a> {
        Box::pin(async move {
            let status = match self {
                Probe::Binary { name } => {
                    match find_on_path(ctx.fs.as_ref(), &ctx.target.path_dirs, name) {
                        Some(found) => {
                            debug!(binary = %name, path = ?found, "binary found on PATH");
                            ProbeStatus::Satisfied
                        }
                        None => ProbeStatus::Unsatisfied,
                    }
                }
                Probe::Directory { path } => {
                    if ctx.fs.is_dir(path) {
                        ProbeStatus::Satisfied
                    } else {
                        ProbeStatus::Unsatisfied
                    }
                }
                Probe::File { path } => {
                    if ctx.fs.is_file(path) {
                        ProbeStatus::Satisfied
                    } else {
                        ProbeStatus::Unsatisfied
                    }
                }
                Probe::FileContains { path, text } => {
                    check_file_content(ctx, path, |content| content.contains(text.as_str()))
                }
                Probe::FileMatches { path, pattern } => {
                    check_file_content(ctx, path, |content| pattern.is_match(content))
                }
                Probe::Package { name } => check_package(ctx, name).await,
                Probe::Command { cmd } => check_command(ctx, cmd).await,
            };
            debug!(probe = %self.describe(), %status, "probe finished");
            status
        })
    }

    fn describe(&self) -> String {
        match self {
            Probe::Binary { name } => format!("binary `{name}` on PATH"),
            Probe::Directory { path } => format!("directory {}", path.display()),
            Probe::File { path } => format!("file {}", path.display()),
            Probe::FileContains { path, text } => {
                format!("{} contains {:?}", path.display(), text)
            }
            Probe::FileMatches { path, pattern } => {
                format!("{} matches /{}/", path.display(), pattern.as_str())
            }
            Probe::Package { name } => format!("package `{name}` installed"),
            Probe::Command { cmd } => format!("`{cmd}` exits 0"),
        }
    }
}

fn check_file_content(
    ctx: &TaskContext,
    path: &Path,
    predicate: impl Fn(&str) -> bool,
) -> ProbeStatus {
    if !ctx.fs.exists(path) {
        return ProbeStatus::Unsatisfied;
    }
    match ctx.fs.read_to_string(path) {
        Ok(content) if predicate(&content) => ProbeStatus::Satisfied,
        Ok(_) => ProbeStatus::Unsatisfied,
        Err(e) => ProbeStatus::Indeterminate(format!("{e:#}")),
    }
}

/// Query line for "is `name` installed?" under the given package manager.
pub fn package_query(pm: PackageManager, name: &str) -> String {
    match pm {
        PackageManager::Apt => format!("dpkg-query -W -f='${{Status}}' {name}"),
        PackageManager::Dnf => format!("rpm -q {name}"),
        PackageManager::Pacman => format!("pacman -Q {name}"),
        PackageManager::Brew => format!("brew list --versions {name}"),
    }
}

async fn check_package(ctx: &TaskContext, name: &str) -> ProbeStatus {
    let Some(pm) = ctx.target.package_manager else {
        return ProbeStatus::Indeterminate("no supported package manager detected".to_string());
    };

    let spec = CommandSpec::new(&ctx.shell, package_query(pm, name)).with_timeout(ctx.probe_timeout);
    match ctx.runner.run(&spec).await {
        // 127: the query tool itself is missing.
        Ok(out) if out.code == Some(127) => {
            ProbeStatus::Indeterminate(format!("`{}` not found", spec.line))
        }
        Ok(out) if out.success() => match pm {
            // dpkg-query succeeds for removed-but-known packages too.
            PackageManager::Apt if !out.stdout.contains("install ok installed") => {
                ProbeStatus::Unsatisfied
            }
            PackageManager::Brew if out.stdout.trim().is_empty() => ProbeStatus::Unsatisfied,
            _ => ProbeStatus::Satisfied,
        },
        Ok(_) => ProbeStatus::Unsatisfied,
        Err(e) => ProbeStatus::Indeterminate(e.to_string()),
    }
}

async fn check_command(ctx: &TaskContext, cmd: &str) -> ProbeStatus {
    let spec = CommandSpec::new(&ctx.shell, cmd).with_timeout(ctx.probe_timeout);
    match ctx.runner.run(&spec).await {
        Ok(out) if out.success() => ProbeStatus::Satisfied,
        Ok(_) => ProbeStatus::Unsatisfied,
        Err(e) => ProbeStatus::Indeterminate(e.to_string()),
    }
}
