// src/config/validate.rs

use std::collections::HashSet;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, ProbeConfig, RawConfigFile, TaskConfig};
use crate::errors::{ConvergeError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ConvergeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_tasks(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(ConvergeError::ConfigError(
            "config must contain at least one [[task]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.shell.trim().is_empty() {
        return Err(ConvergeError::ConfigError(
            "[config].shell must not be empty".to_string(),
        ));
    }
    cfg.config.default_timeout()?;
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for task in cfg.task.iter() {
        if task.name.is_empty() || task.name.chars().any(char::is_whitespace) {
            return Err(ConvergeError::ConfigError(format!(
                "invalid task name {:?}: names must be non-empty and contain no whitespace",
                task.name
            )));
        }
        if !seen.insert(task.name.as_str()) {
            return Err(ConvergeError::ConfigError(format!(
                "task '{}' is declared more than once",
                task.name
            )));
        }
        if task.apply.is_empty() || task.apply.iter().any(|c| c.trim().is_empty()) {
            return Err(ConvergeError::ConfigError(format!(
                "task '{}' needs at least one non-empty `apply` command",
                task.name
            )));
        }
        validate_probe(task)?;
        task.timeout()?;
        task.retry_policy()?;
    }
    Ok(())
}

fn validate_probe(task: &TaskConfig) -> Result<()> {
    let empty_field = match &task.probe {
        ProbeConfig::Binary { name } | ProbeConfig::Package { name } => name.trim().is_empty(),
        ProbeConfig::Directory { path } | ProbeConfig::File { path } => path.trim().is_empty(),
        ProbeConfig::FileContains { path, text } => path.trim().is_empty() || text.is_empty(),
        ProbeConfig::FileMatches { path, .. } => path.trim().is_empty(),
        ProbeConfig::Command { cmd } => cmd.trim().is_empty(),
    };
    if empty_field {
        return Err(ConvergeError::ConfigError(format!(
            "task '{}' has a probe with an empty field",
            task.name
        )));
    }
    // Compiles the regex for `file_matches`.
    task.probe.build()?;
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    let names: HashSet<&str> = cfg.task.iter().map(|t| t.name.as_str()).collect();
    for task in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == &task.name {
                return Err(ConvergeError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    task.name
                )));
            }
            if !names.contains(dep.as_str()) {
                return Err(ConvergeError::UnknownTask(format!(
                    "'{}' (required by '{}')",
                    dep, task.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task. For
    //   [[task]]
    //   name = "B"
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for task in cfg.task.iter() {
        graph.add_node(task.name.as_str());
    }

    for task in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), task.name.as_str(), ());
        }
    }

    let on_cycle: HashSet<&str> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .flatten()
        .collect();

    if on_cycle.is_empty() {
        return Ok(());
    }

    // Report in declaration order for stable messages.
    let members = cfg
        .task
        .iter()
        .map(|t| t.name.clone())
        .filter(|n| on_cycle.contains(n.as_str()))
        .collect();
    Err(ConvergeError::CyclicDependency(members))
}
