// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod task;
pub mod types;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::TaskGraph;
use crate::engine::{
    render, AutoConfirm, CancelToken, Confirmer, Orchestrator, OrchestratorOptions, RunLog,
    RunSummary, StdinConfirmer,
};
use crate::errors::{ConvergeError, Result};
use crate::exec::{CommandRunner, ShellCommandRunner, TargetInfo};
use crate::fs::{FileSystem, RealFileSystem};
use crate::task::TaskContext;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - catalog loading and validation
/// - target detection and graph selection (`--only`)
/// - the run log
/// - the orchestrator with the real command runner
/// - Ctrl-C handling
///
/// Any error returned from here happened before a single task was probed.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let target = TargetInfo::detect(fs.as_ref());
    info!(
        os = %target.os,
        package_manager = ?target.package_manager,
        shell = ?target.shell,
        "target detected"
    );

    let graph = build_graph(&cfg, &target, &args.only)?;
    let default_timeout = match args.task_timeout {
        Some(t) => Some(t),
        None => cfg.default_timeout()?,
    };

    let log_path = args.log_path.clone().or_else(|| cfg.log_path());
    let log = open_run_log(log_path.as_deref())?;

    let runner: Arc<dyn CommandRunner> = Arc::new(ShellCommandRunner);
    let ctx = TaskContext {
        runner,
        fs,
        target,
        shell: cfg.config.shell.clone(),
        probe_timeout: default_timeout,
    };

    let options = OrchestratorOptions {
        dry_run: args.dry_run,
        force_degraded: args.continue_on_error || cfg.config.continue_on_error,
        default_timeout,
    };

    // Ctrl-C → stop before the next task.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            warn!("interrupt received; finishing the current task then stopping");
            cancel.cancel();
        });
    }

    let orchestrator = Orchestrator::new(
        &graph,
        ctx,
        log,
        select_confirmer(args.yes),
        cancel,
        options,
    );
    let record = orchestrator.run().await;

    print!("{}", render(&record));
    Ok(RunSummary::from_record(&record).exit_code())
}

/// Build the graph for this run: the whole catalog, minus tasks that do not
/// apply to `target`, restricted to `only` (plus dependencies) if given.
pub fn build_graph(cfg: &ConfigFile, target: &TargetInfo, only: &[String]) -> Result<TaskGraph> {
    let full = TaskGraph::new(cfg.to_tasks()?)?;

    if let Some(unknown) = only.iter().find(|name| !full.contains(name)) {
        return Err(ConvergeError::UnknownTask(format!(
            "'{unknown}' (requested by --only)"
        )));
    }

    let (applicable, dropped) = full.for_target(target)?;
    if only.is_empty() {
        return Ok(applicable);
    }

    let requested: Vec<String> = only
        .iter()
        .filter(|name| {
            let keep = !dropped.contains(name);
            if !keep {
                warn!(task = %name, "requested task does not apply to this target");
            }
            keep
        })
        .cloned()
        .collect();

    if requested.is_empty() {
        return Err(ConvergeError::ConfigError(
            "none of the tasks passed to --only apply to this target".to_string(),
        ));
    }
    applicable.restrict_to(&requested)
}

fn open_run_log(path: Option<&Path>) -> Result<RunLog> {
    match path {
        Some(path) => RunLog::open(path).map_err(|e| {
            ConvergeError::ConfigError(format!("opening run log {:?}: {e}", path))
        }),
        None => Ok(RunLog::in_memory()),
    }
}

fn select_confirmer(assume_yes: bool) -> Arc<dyn Confirmer> {
    if assume_yes {
        Arc::new(AutoConfirm(true))
    } else if std::io::stdin().is_terminal() {
        Arc::new(StdinConfirmer)
    } else {
        info!("stdin is not a terminal; confirmation prompts will be declined");
        Arc::new(AutoConfirm(false))
    }
}
