// src/config/model.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::config::duration::parse_duration;
use crate::errors::{ConvergeError, Result};
use crate::fs::expand_home;
use crate::task::{Probe, RetryPolicy, ShellSteps, StateProbe, TargetFilter, Task};
use crate::types::FailurePolicy;

/// Task catalog as read from TOML, before validation.
///
/// ```toml
/// [config]
/// log_path = "~/.local/state/converge/run.log"
/// default_timeout = "10m"
///
/// [[task]]
/// name = "git"
/// probe = { kind = "binary", name = "git" }
/// apply = ["sudo apt-get install -y git"]
///
/// [[task]]
/// name = "oh-my-zsh"
/// after = ["git"]
/// probe = { kind = "directory", path = "~/.oh-my-zsh" }
/// apply = ["sh -c \"$(curl -fsSL https://example.invalid/install.sh)\" \"\" --unattended"]
/// policy = "degraded"
/// retries = 2
/// ```
///
/// `[[task]]` is an array so declaration order survives parsing; that
/// order breaks ties when scheduling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub task: Vec<TaskConfig>,
}

/// Validated catalog. Construct with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub task: Vec<TaskConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Run log location; `--log-path` takes precedence.
    #[serde(default)]
    pub log_path: Option<String>,

    /// Apply timeout for tasks without their own `timeout`.
    #[serde(default)]
    pub default_timeout: Option<String>,

    /// Same as passing `--continue-on-error`.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Interpreter for every command string.
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_shell() -> String {
    "sh".to_string()
}

impl ConfigSection {
    pub fn default_timeout(&self) -> Result<Option<Duration>> {
        parse_opt_duration("[config].default_timeout", &self.default_timeout)
    }
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            log_path: None,
            default_timeout: None,
            continue_on_error: false,
            shell: default_shell(),
        }
    }
}

/// `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub probe: ProbeConfig,

    /// Command lines run in order when the probe is unsatisfied.
    pub apply: Vec<String>,

    /// Names of tasks that must succeed first.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub policy: FailurePolicy,

    /// Re-probe after applying; defaults to `true`.
    #[serde(default = "default_verify")]
    pub verify: bool,

    #[serde(default)]
    pub timeout: Option<String>,

    /// Extra attempts for network or timeout failures.
    #[serde(default)]
    pub retries: u32,

    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(default)]
    pub confirm: Option<String>,

    #[serde(default)]
    pub only_on: TargetFilter,
}

fn default_verify() -> bool {
    true
}

/// `probe = { kind = "...", ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeConfig {
    Binary { name: String },
    Directory { path: String },
    File { path: String },
    FileContains { path: String, text: String },
    FileMatches { path: String, pattern: String },
    Package { name: String },
    Command { cmd: String },
}

impl ProbeConfig {
    pub fn build(&self) -> Result<Probe> {
        let probe = match self {
            ProbeConfig::Binary { name } => Probe::Binary { name: name.clone() },
            ProbeConfig::Directory { path } => Probe::Directory {
                path: expand_home(path),
            },
            ProbeConfig::File { path } => Probe::File {
                path: expand_home(path),
            },
            ProbeConfig::FileContains { path, text } => Probe::FileContains {
                path: expand_home(path),
                text: text.clone(),
            },
            ProbeConfig::FileMatches { path, pattern } => Probe::FileMatches {
                path: expand_home(path),
                pattern: Regex::new(pattern).map_err(|e| {
                    ConvergeError::ConfigError(format!("invalid file_matches pattern '{pattern}': {e}"))
                })?,
            },
            ProbeConfig::Package { name } => Probe::Package { name: name.clone() },
            ProbeConfig::Command { cmd } => Probe::Command { cmd: cmd.clone() },
        };
        Ok(probe)
    }
}

fn parse_opt_duration(field: &str, value: &Option<String>) -> Result<Option<Duration>> {
    value
        .as_deref()
        .map(parse_duration)
        .transpose()
        .map_err(|e| ConvergeError::ConfigError(format!("invalid {field}: {e}")))
}

impl ConfigFile {
    pub fn new_unchecked(config: ConfigSection, task: Vec<TaskConfig>) -> Self {
        Self { config, task }
    }

    pub fn default_timeout(&self) -> Result<Option<Duration>> {
        self.config.default_timeout()
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.config.log_path.as_deref().map(expand_home)
    }

    /// Turn every `[[task]]` into an engine [`Task`], in declaration order.
    pub fn to_tasks(&self) -> Result<Vec<Task>> {
        self.task.iter().map(TaskConfig::to_task).collect()
    }
}

impl TaskConfig {
    pub fn timeout(&self) -> Result<Option<Duration>> {
        parse_opt_duration(&format!("timeout for task '{}'", self.name), &self.timeout)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let delay = parse_opt_duration(
            &format!("retry_delay for task '{}'", self.name),
            &self.retry_delay,
        )?;
        Ok(RetryPolicy::new(self.retries, delay.unwrap_or_default()))
    }

    pub fn to_task(&self) -> Result<Task> {
        let probe: Arc<dyn StateProbe> = Arc::new(self.probe.build()?);
        let apply = Arc::new(ShellSteps::new(self.apply.clone()));

        let mut task = Task::new(self.name.clone(), probe, apply)
            .policy(self.policy)
            .verify(self.verify)
            .retry(self.retry_policy()?)
            .only_on(self.only_on.clone());
        task.deps = self.after.clone();
        task.timeout = self.timeout()?;
        task.confirm = self.confirm.clone();
        task.description = self.description.clone();
        Ok(task)
    }
}
