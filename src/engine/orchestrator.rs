// src/engine/orchestrator.rs

//! Sequential probe / apply / verify loop over a [`TaskGraph`].
//!
//! Per-task states: `Pending -> {Skipped | Running -> {Applied | Failed}} | Blocked`.
//! Run states: `Initializing -> Executing -> {Completed | Aborted}`.
//!
//! Tasks run one at a time in topological order. Anything that goes wrong
//! inside a task is turned into that task's [`TaskOutcome`]; nothing here
//! returns an error.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::dag::TaskGraph;
use crate::engine::cancel::CancelToken;
use crate::engine::confirm::Confirmer;
use crate::engine::runlog::{RunLog, RunRecord};
use crate::engine::{
    BlockReason, FailureCause, OrchestratorOptions, RunState, SkipReason, TaskOutcome,
};
use crate::task::{ApplyError, ProbeStatus, Task, TaskContext, TaskName};
use crate::types::{FailurePolicy, Phase};

pub struct Orchestrator<'g> {
    graph: &'g TaskGraph,
    ctx: TaskContext,
    log: RunLog,
    confirmer: Arc<dyn Confirmer>,
    cancel: CancelToken,
    options: OrchestratorOptions,
    state: RunState,
}

impl<'g> Orchestrator<'g> {
    pub fn new(
        graph: &'g TaskGraph,
        ctx: TaskContext,
        log: RunLog,
        confirmer: Arc<dyn Confirmer>,
        cancel: CancelToken,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            graph,
            ctx,
            log,
            confirmer,
            cancel,
            options,
            state: RunState::Initializing,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Drive the whole graph and hand back the sealed record.
    pub async fn run(mut self) -> RunRecord {
        let graph = self.graph;
        let order = graph.execution_order();
        info!(
            tasks = order.len(),
            dry_run = self.options.dry_run,
            force_degraded = self.options.force_degraded,
            "run started"
        );
        self.state = RunState::Executing;

        let mut outcomes: Vec<(TaskName, TaskOutcome)> = Vec::with_capacity(order.len());
        let mut resolved: HashMap<&str, usize> = HashMap::with_capacity(order.len());
        let mut halted: Option<BlockReason> = None;

        for task in order {
            let outcome = if let Some(reason) = &halted {
                self.block(task, reason.clone())
            } else if self.cancel.is_cancelled() {
                warn!(task = %task.name, "cancellation requested; not starting further tasks");
                self.state = RunState::Aborted;
                halted = Some(BlockReason::Cancelled);
                self.block(task, BlockReason::Cancelled)
            } else {
                let policy = self.policy_for(task);
                let failed_dep = task.deps.iter().find(|dep| {
                    resolved
                        .get(dep.as_str())
                        .is_some_and(|&i| outcomes[i].1.is_unsuccessful())
                });

                let outcome = match failed_dep {
                    Some(dep) => self.block(task, BlockReason::DependencyFailed(dep.clone())),
                    None => self.execute(task, policy).await,
                };

                if outcome.is_unsuccessful() && policy == FailurePolicy::Fatal {
                    error!(task = %task.name, "fatal task did not succeed; aborting run");
                    self.state = RunState::Aborted;
                    halted = Some(BlockReason::RunAborted {
                        by: task.name.clone(),
                    });
                }
                outcome
            };

            resolved.insert(task.name.as_str(), outcomes.len());
            outcomes.push((task.name.clone(), outcome));
        }

        if self.state == RunState::Executing {
            self.state = RunState::Completed;
        }
        info!(state = ?self.state, "run finished");

        self.log.finish(self.state, outcomes, self.options.dry_run)
    }

    fn policy_for(&self, task: &Task) -> FailurePolicy {
        if self.options.force_degraded {
            FailurePolicy::Degraded
        } else {
            task.policy
        }
    }

    fn block(&mut self, task: &Task, reason: BlockReason) -> TaskOutcome {
        info!(task = %task.name, %reason, "task blocked");
        self.log
            .record(&task.name, Phase::Probe, "blocked", Some(reason.to_string()));
        TaskOutcome::Blocked(reason)
    }

    async fn execute(&mut self, task: &Task, policy: FailurePolicy) -> TaskOutcome {
        debug!(task = %task.name, ?policy, probe = %task.probe.describe(), "probing");

        let status = task.probe.check(&self.ctx).await;
        match &status {
            ProbeStatus::Satisfied => {
                info!(task = %task.name, "already satisfied; skipping");
                self.log.record(&task.name, Phase::Probe, "skipped", None);
                return TaskOutcome::Skipped(SkipReason::Satisfied);
            }
            ProbeStatus::Indeterminate(reason) => {
                warn!(task = %task.name, %reason, "probe indeterminate; treating as unsatisfied");
            }
            ProbeStatus::Unsatisfied => {}
        }

        if self.options.dry_run {
            info!(task = %task.name, %status, "would apply (dry run)");
            self.log
                .record(&task.name, Phase::Probe, "planned", Some(status.to_string()));
            return TaskOutcome::Planned;
        }

        let detail = matches!(status, ProbeStatus::Indeterminate(_)).then(|| status.to_string());
        self.log
            .record(&task.name, Phase::Probe, status.label(), detail);

        if let Some(prompt) = &task.confirm {
            if !self.confirmer.confirm(&task.name, prompt) {
                info!(task = %task.name, "confirmation declined; not applying");
                self.log.record(&task.name, Phase::Apply, "declined", None);
                return TaskOutcome::Skipped(SkipReason::Declined);
            }
        }

        if let Err(err) = self.apply_with_retry(task).await {
            error!(task = %task.name, kind = %err.kind, error = %err.message, "apply failed");
            self.log
                .record(&task.name, Phase::Apply, "failed", Some(err.to_string()));
            return TaskOutcome::Failed(FailureCause::Apply(err));
        }

        if !task.verify {
            info!(task = %task.name, "applied (verification disabled)");
            self.log.record(&task.name, Phase::Apply, "applied", None);
            return TaskOutcome::Applied;
        }
        self.log.record(&task.name, Phase::Apply, "ok", None);

        let post = task.probe.check(&self.ctx).await;
        if post.is_satisfied() {
            info!(task = %task.name, "applied and verified");
            self.log.record(&task.name, Phase::Verify, "applied", None);
            TaskOutcome::Applied
        } else {
            error!(task = %task.name, probe = %post, "apply did not converge");
            let cause = FailureCause::VerificationFailed(post);
            self.log
                .record(&task.name, Phase::Verify, "failed", Some(cause.to_string()));
            TaskOutcome::Failed(cause)
        }
    }

    async fn apply_with_retry(&mut self, task: &Task) -> Result<(), ApplyError> {
        let mut attempt = 1;
        loop {
            info!(task = %task.name, attempt, "applying");
            match self.apply_once(task).await {
                Ok(()) => return Ok(()),
                Err(err) if task.retry.should_retry(&err, attempt) => {
                    warn!(
                        task = %task.name,
                        attempt,
                        kind = %err.kind,
                        error = %err.message,
                        delay = ?task.retry.delay,
                        "transient apply failure; retrying"
                    );
                    self.log
                        .record(&task.name, Phase::Apply, "retry", Some(err.to_string()));
                    if !task.retry.delay.is_zero() {
                        tokio::time::sleep(task.retry.delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn apply_once(&self, task: &Task) -> Result<(), ApplyError> {
        match task.timeout.or(self.options.default_timeout) {
            Some(limit) => tokio::time::timeout(limit, task.apply.apply(&self.ctx))
                .await
                .unwrap_or_else(|_| Err(ApplyError::timeout(limit))),
            None => task.apply.apply(&self.ctx).await,
        }
    }
}
