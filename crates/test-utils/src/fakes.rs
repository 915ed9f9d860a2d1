#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use converge::dag::TaskGraph;
use converge::engine::{
    AutoConfirm, CancelToken, Confirmer, Orchestrator, OrchestratorOptions, RunLog, RunRecord,
};
use converge::exec::runner::CommandFuture;
use converge::exec::{CommandError, CommandOutput, CommandRunner, CommandSpec, TargetInfo};
use converge::fs::mock::MockFileSystem;
use converge::fs::FileSystem;
use converge::task::apply::ApplyFuture;
use converge::task::probe::ProbeFuture;
use converge::task::{
    ApplyAction, ApplyError, ApplyErrorKind, ProbeStatus, StateProbe, Task, TaskContext,
};

use crate::builders::target;

/// Canned reply for a scripted command.
#[derive(Debug, Clone)]
pub enum Reply {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    SpawnFails,
    TimesOut,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Exit {
            code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Reply::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

/// A fake command runner that:
/// - records every command line it is asked to run
/// - answers from a script (queued one-shot replies first, then sticky
///   replies), defaulting to a successful exit.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    calls: Arc<Mutex<Vec<String>>>,
    once: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    sticky: Arc<Mutex<HashMap<String, Reply>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, line: &str, reply: Reply) {
        self.sticky.lock().unwrap().insert(line.to_string(), reply);
    }

    pub fn respond_once(&self, line: &str, reply: Reply) {
        self.once
            .lock()
            .unwrap()
            .entry(line.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn reply_for(&self, line: &str) -> Reply {
        if let Some(reply) = self
            .once
            .lock()
            .unwrap()
            .get_mut(line)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        self.sticky
            .lock()
            .unwrap()
            .get(line)
            .cloned()
            .unwrap_or_else(|| Reply::ok(""))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> CommandFuture<'a> {
        self.calls.lock().unwrap().push(spec.line.clone());
        let reply = self.reply_for(&spec.line);
        Box::pin(async move {
            match reply {
                Reply::Exit {
                    code,
                    stdout,
                    stderr,
                } => Ok(CommandOutput {
                    code: Some(code),
                    stdout,
                    stderr,
                }),
                Reply::SpawnFails => Err(CommandError::Spawn {
                    line: spec.line.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                }),
                Reply::TimesOut => Err(CommandError::TimedOut {
                    line: spec.line.clone(),
                    after: spec.timeout.unwrap_or(Duration::from_secs(1)),
                }),
            }
        })
    }
}

/// How a fake task's apply behaves.
#[derive(Clone)]
pub enum ApplyBehavior {
    /// Succeeds and makes the probe satisfied.
    Converge,
    /// Succeeds at the process level but changes nothing.
    NoOp,
    Fail(ApplyErrorKind),
    /// Fails `n` times with `kind`, then converges.
    FailTimes(usize, ApplyErrorKind),
    /// Never finishes.
    Hang,
    /// Runs the hook, then converges.
    ConvergeThen(Arc<dyn Fn() + Send + Sync>),
}

impl fmt::Debug for ApplyBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyBehavior::Converge => f.write_str("Converge"),
            ApplyBehavior::NoOp => f.write_str("NoOp"),
            ApplyBehavior::Fail(kind) => write!(f, "Fail({kind})"),
            ApplyBehavior::FailTimes(n, kind) => write!(f, "FailTimes({n}, {kind})"),
            ApplyBehavior::Hang => f.write_str("Hang"),
            ApplyBehavior::ConvergeThen(_) => f.write_str("ConvergeThen(..)"),
        }
    }
}

/// Simulated machine state shared by fake probes and applies.
///
/// The journal records `probe:<name>` and `apply:<name>` in call order.
#[derive(Debug, Clone, Default)]
pub struct FakeWorld {
    installed: Arc<Mutex<HashSet<String>>>,
    broken_probes: Arc<Mutex<HashSet<String>>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl FakeWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// A task whose probe checks `name` is installed and whose apply
    /// behaves as `behavior`.
    pub fn task(&self, name: &str, behavior: ApplyBehavior) -> Task {
        let probe = Arc::new(FakeProbe {
            key: name.to_string(),
            world: self.clone(),
        });
        let apply = Arc::new(FakeApply {
            key: name.to_string(),
            world: self.clone(),
            behavior,
            attempts: Arc::new(AtomicUsize::new(0)),
        });
        Task::new(name, probe, apply)
    }

    pub fn install(&self, name: &str) {
        self.installed.lock().unwrap().insert(name.to_string());
    }

    pub fn uninstall(&self, name: &str) {
        self.installed.lock().unwrap().remove(name);
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.lock().unwrap().contains(name)
    }

    /// Make the probe for `name` report `Indeterminate`.
    pub fn break_probe(&self, name: &str) {
        self.broken_probes.lock().unwrap().insert(name.to_string());
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    /// Names of tasks whose apply ran, in order (one entry per attempt).
    pub fn applied(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter_map(|e| e.strip_prefix("apply:").map(str::to_string))
            .collect()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().unwrap().clear();
    }

    fn log(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

#[derive(Debug)]
struct FakeProbe {
    key: String,
    world: FakeWorld,
}

impl StateProbe for FakeProbe {
    fn check<'a>(&'a self, _ctx: &'a TaskContext) -> ProbeFuture<'a> {
        self.world.log(format!("probe:{}", self.key));
        let status = if self.world.broken_probes.lock().unwrap().contains(&self.key) {
            ProbeStatus::Indeterminate("query failed".to_string())
        } else if self.world.is_installed(&self.key) {
            ProbeStatus::Satisfied
        } else {
            ProbeStatus::Unsatisfied
        };
        Box::pin(async move { status })
    }

    fn describe(&self) -> String {
        format!("fake `{}` installed", self.key)
    }
}

#[derive(Debug)]
struct FakeApply {
    key: String,
    world: FakeWorld,
    behavior: ApplyBehavior,
    attempts: Arc<AtomicUsize>,
}

impl ApplyAction for FakeApply {
    fn apply<'a>(&'a self, _ctx: &'a TaskContext) -> ApplyFuture<'a> {
        Box::pin(async move {
            self.world.log(format!("apply:{}", self.key));
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match &self.behavior {
                ApplyBehavior::Converge => {
                    self.world.install(&self.key);
                    Ok(())
                }
                ApplyBehavior::NoOp => Ok(()),
                ApplyBehavior::Fail(kind) => {
                    Err(ApplyError::new(*kind, format!("{} failed", self.key)))
                }
                ApplyBehavior::FailTimes(n, kind) if attempt <= *n => Err(ApplyError::new(
                    *kind,
                    format!("{} failed (attempt {attempt})", self.key),
                )),
                ApplyBehavior::FailTimes(..) => {
                    self.world.install(&self.key);
                    Ok(())
                }
                ApplyBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
                ApplyBehavior::ConvergeThen(hook) => {
                    hook();
                    self.world.install(&self.key);
                    Ok(())
                }
            }
        })
    }
}

/// Context backed by the given runner and a mock filesystem.
pub fn test_context(runner: Arc<dyn CommandRunner>, fs: Arc<dyn FileSystem>, target: TargetInfo) -> TaskContext {
    TaskContext {
        runner,
        fs,
        target,
        shell: "sh".to_string(),
        probe_timeout: None,
    }
}

/// Harness around [`Orchestrator`] with fakes for every collaborator.
pub struct Harness {
    pub runner: ScriptedRunner,
    pub fs: MockFileSystem,
    pub target: TargetInfo,
    pub options: OrchestratorOptions,
    pub confirmer: Arc<dyn Confirmer>,
    pub cancel: CancelToken,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            runner: ScriptedRunner::new(),
            fs: MockFileSystem::new(),
            target: target(None, None),
            options: OrchestratorOptions::default(),
            confirmer: Arc::new(AutoConfirm(true)),
            cancel: CancelToken::new(),
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.options.dry_run = true;
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.options.force_degraded = true;
        self
    }

    pub fn confirm_with(mut self, answer: bool) -> Self {
        self.confirmer = Arc::new(AutoConfirm(answer));
        self
    }

    pub fn context(&self) -> TaskContext {
        test_context(
            Arc::new(self.runner.clone()),
            Arc::new(self.fs.clone()),
            self.target.clone(),
        )
    }

    pub async fn run(&self, graph: &TaskGraph) -> RunRecord {
        self.run_with_log(graph, RunLog::in_memory()).await
    }

    pub async fn run_with_log(&self, graph: &TaskGraph, log: RunLog) -> RunRecord {
        Orchestrator::new(
            graph,
            self.context(),
            log,
            Arc::clone(&self.confirmer),
            self.cancel.clone(),
            self.options,
        )
        .run()
        .await
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
