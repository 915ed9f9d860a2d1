mod common;
use crate::common::fakes::{ApplyBehavior, FakeWorld, Harness};
use crate::common::{init_tracing, with_timeout};

use std::time::Duration;

use converge::dag::TaskGraph;
use converge::engine::{
    BlockReason, FailureCause, RunState, RunSummary, TaskOutcome, EXIT_ABORTED, EXIT_DEGRADED,
};
use converge::task::{ApplyErrorKind, ProbeStatus, RetryPolicy};
use converge::types::FailurePolicy;

#[tokio::test]
async fn fatal_failure_aborts_and_blocks_the_rest() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world.task("A", ApplyBehavior::Fail(ApplyErrorKind::Permission)),
        world.task("B", ApplyBehavior::Converge).after("A"),
        world.task("C", ApplyBehavior::Converge),
    ])
    .unwrap();

    let record = with_timeout(Harness::new().run(&graph)).await;

    assert_eq!(record.state, RunState::Aborted);
    match record.outcome_of("A") {
        Some(TaskOutcome::Failed(FailureCause::Apply(err))) => {
            assert_eq!(err.kind, ApplyErrorKind::Permission);
        }
        other => panic!("expected A to fail on apply, got {other:?}"),
    }
    // Nothing after a fatal failure runs, dependent or not.
    assert_eq!(
        record.outcome_of("B"),
        Some(&TaskOutcome::Blocked(BlockReason::RunAborted { by: "A".into() }))
    );
    assert_eq!(
        record.outcome_of("C"),
        Some(&TaskOutcome::Blocked(BlockReason::RunAborted { by: "A".into() }))
    );
    assert_eq!(world.applied(), vec!["A"]);
    assert_eq!(RunSummary::from_record(&record).exit_code(), EXIT_ABORTED);
}

#[tokio::test]
async fn degraded_failure_blocks_dependents_and_keeps_independent_tasks() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world
            .task("A", ApplyBehavior::Fail(ApplyErrorKind::Network))
            .policy(FailurePolicy::Degraded),
        world
            .task("B", ApplyBehavior::Converge)
            .after("A")
            .policy(FailurePolicy::Degraded),
        world.task("C", ApplyBehavior::Converge),
    ])
    .unwrap();

    let record = with_timeout(Harness::new().run(&graph)).await;

    assert_eq!(record.state, RunState::Completed);
    assert!(matches!(record.outcome_of("A"), Some(TaskOutcome::Failed(_))));
    assert_eq!(
        record.outcome_of("B"),
        Some(&TaskOutcome::Blocked(BlockReason::DependencyFailed("A".into())))
    );
    assert_eq!(record.outcome_of("C"), Some(&TaskOutcome::Applied));
    assert_eq!(world.applied(), vec!["A", "C"]);

    let summary = RunSummary::from_record(&record);
    assert_eq!((summary.failed, summary.blocked, summary.applied), (1, 1, 1));
    assert_eq!(summary.exit_code(), EXIT_DEGRADED);
}

#[tokio::test]
async fn blocked_fatal_task_aborts_the_run() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world
            .task("A", ApplyBehavior::Fail(ApplyErrorKind::Structural))
            .policy(FailurePolicy::Degraded),
        // Fatal, but never gets to run.
        world.task("B", ApplyBehavior::Converge).after("A"),
        world.task("C", ApplyBehavior::Converge),
    ])
    .unwrap();

    let record = with_timeout(Harness::new().run(&graph)).await;

    assert_eq!(record.state, RunState::Aborted);
    assert_eq!(
        record.outcome_of("B"),
        Some(&TaskOutcome::Blocked(BlockReason::DependencyFailed("A".into())))
    );
    assert_eq!(
        record.outcome_of("C"),
        Some(&TaskOutcome::Blocked(BlockReason::RunAborted { by: "B".into() }))
    );
}

#[tokio::test]
async fn continue_on_error_downgrades_fatal_tasks() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world.task("A", ApplyBehavior::Fail(ApplyErrorKind::Permission)),
        world.task("C", ApplyBehavior::Converge),
    ])
    .unwrap();

    let record = with_timeout(Harness::new().continue_on_error().run(&graph)).await;

    assert_eq!(record.state, RunState::Completed);
    assert_eq!(record.outcome_of("C"), Some(&TaskOutcome::Applied));
    assert_eq!(RunSummary::from_record(&record).exit_code(), EXIT_DEGRADED);
}

#[tokio::test]
async fn apply_that_does_not_converge_fails_verification() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![world
        .task("rust", ApplyBehavior::NoOp)
        .policy(FailurePolicy::Degraded)])
    .unwrap();

    let record = with_timeout(Harness::new().run(&graph)).await;

    assert_eq!(
        record.outcome_of("rust"),
        Some(&TaskOutcome::Failed(FailureCause::VerificationFailed(
            ProbeStatus::Unsatisfied
        )))
    );
    let last = record.events_for("rust").last().unwrap();
    assert_eq!(last.outcome, "failed");
    assert!(last.detail.as_deref().unwrap().contains("did not converge"));
}

#[tokio::test]
async fn network_failures_are_retried_until_success() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![world
        .task("nvm", ApplyBehavior::FailTimes(2, ApplyErrorKind::Network))
        .retry(RetryPolicy::new(3, Duration::from_millis(1)))])
    .unwrap();

    let record = with_timeout(Harness::new().run(&graph)).await;

    assert_eq!(record.outcome_of("nvm"), Some(&TaskOutcome::Applied));
    assert_eq!(world.applied().len(), 3);
    assert_eq!(
        record
            .events_for("nvm")
            .filter(|e| e.outcome == "retry")
            .count(),
        2
    );
}

#[tokio::test]
async fn retries_are_bounded() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![world
        .task("nvm", ApplyBehavior::Fail(ApplyErrorKind::Network))
        .retry(RetryPolicy::new(2, Duration::ZERO))
        .policy(FailurePolicy::Degraded)])
    .unwrap();

    let record = with_timeout(Harness::new().run(&graph)).await;

    assert!(matches!(record.outcome_of("nvm"), Some(TaskOutcome::Failed(_))));
    assert_eq!(world.applied().len(), 3, "first attempt plus two retries");
}

#[tokio::test]
async fn permission_failures_are_never_retried() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![world
        .task("docker", ApplyBehavior::Fail(ApplyErrorKind::Permission))
        .retry(RetryPolicy::new(5, Duration::ZERO))
        .policy(FailurePolicy::Degraded)])
    .unwrap();

    let record = with_timeout(Harness::new().run(&graph)).await;

    assert!(matches!(record.outcome_of("docker"), Some(TaskOutcome::Failed(_))));
    assert_eq!(world.applied(), vec!["docker"]);
}

#[tokio::test]
async fn hanging_apply_times_out_as_a_failure() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world
            .task("slow", ApplyBehavior::Hang)
            .timeout(Duration::from_millis(50))
            .policy(FailurePolicy::Degraded),
        world.task("next", ApplyBehavior::Converge),
    ])
    .unwrap();

    let record = with_timeout(Harness::new().run(&graph)).await;

    match record.outcome_of("slow") {
        Some(TaskOutcome::Failed(FailureCause::Apply(err))) => {
            assert_eq!(err.kind, ApplyErrorKind::Timeout);
        }
        other => panic!("expected a timeout failure, got {other:?}"),
    }
    assert_eq!(record.outcome_of("next"), Some(&TaskOutcome::Applied));
}

#[tokio::test]
async fn default_timeout_applies_to_tasks_without_their_own() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![world
        .task("slow", ApplyBehavior::Hang)
        .policy(FailurePolicy::Degraded)])
    .unwrap();
    let mut harness = Harness::new();
    harness.options.default_timeout = Some(Duration::from_millis(50));

    let record = with_timeout(harness.run(&graph)).await;

    assert!(matches!(
        record.outcome_of("slow"),
        Some(TaskOutcome::Failed(FailureCause::Apply(_)))
    ));
}
