mod common;
use crate::common::builders::target;
use crate::common::fakes::{ApplyBehavior, FakeWorld, Harness};
use crate::common::{init_tracing, with_timeout};

use converge::dag::TaskGraph;
use converge::errors::ConvergeError;
use converge::task::TargetFilter;
use converge::types::PackageManager;

fn names(graph: &TaskGraph) -> Vec<String> {
    graph
        .execution_order()
        .into_iter()
        .map(|t| t.name.clone())
        .collect()
}

#[test]
fn dependencies_run_before_dependents() {
    let world = FakeWorld::new();
    // Declared out of order on purpose.
    let graph = TaskGraph::new(vec![
        world.task("oh-my-zsh", ApplyBehavior::Converge).after("zsh").after("git"),
        world.task("zsh", ApplyBehavior::Converge),
        world.task("git", ApplyBehavior::Converge),
    ])
    .unwrap();

    assert_eq!(names(&graph), vec!["zsh", "git", "oh-my-zsh"]);
}

#[test]
fn ready_tasks_run_in_declaration_order() {
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world.task("c", ApplyBehavior::Converge),
        world.task("a", ApplyBehavior::Converge),
        world.task("d", ApplyBehavior::Converge).after("b"),
        world.task("b", ApplyBehavior::Converge),
    ])
    .unwrap();

    // `d` becomes ready only after `b`, and then it is the only ready task.
    assert_eq!(names(&graph), vec!["c", "a", "b", "d"]);
}

#[test]
fn only_pulls_in_transitive_dependencies() {
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world.task("taskZ", ApplyBehavior::Converge),
        world.task("taskX", ApplyBehavior::Converge).after("taskZ"),
        world.task("taskY", ApplyBehavior::Converge).after("taskX"),
        world.task("unrelated", ApplyBehavior::Converge),
    ])
    .unwrap();

    let selected = graph.restrict_to(&["taskY".to_string()]).unwrap();
    assert_eq!(names(&selected), vec!["taskZ", "taskX", "taskY"]);
    assert!(!selected.contains("unrelated"));
}

#[test]
fn only_with_several_names_keeps_order() {
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world.task("taskX", ApplyBehavior::Converge),
        world.task("taskY", ApplyBehavior::Converge),
        world.task("taskW", ApplyBehavior::Converge),
    ])
    .unwrap();

    let selected = graph
        .restrict_to(&["taskY".to_string(), "taskX".to_string()])
        .unwrap();
    assert_eq!(names(&selected), vec!["taskX", "taskY"]);
}

#[test]
fn only_with_unknown_name_is_rejected() {
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![world.task("git", ApplyBehavior::Converge)]).unwrap();

    match graph.restrict_to(&["gti".to_string()]) {
        Err(ConvergeError::UnknownTask(msg)) => assert!(msg.contains("gti")),
        other => panic!("expected UnknownTask, got {other:?}"),
    }
}

#[test]
fn dependents_and_dependencies_are_queryable() {
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world.task("git", ApplyBehavior::Converge),
        world.task("b", ApplyBehavior::Converge).after("git"),
        world.task("a", ApplyBehavior::Converge).after("git"),
    ])
    .unwrap();

    assert_eq!(graph.dependents_of("git"), vec!["b", "a"]);
    assert_eq!(graph.dependencies_of("a"), ["git".to_string()]);
    assert!(graph.dependents_of("missing").is_empty());
}

#[test]
fn tasks_for_other_targets_are_dropped_with_their_edges() {
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world
            .task("apt-update", ApplyBehavior::Converge)
            .only_on(TargetFilter {
                package_manager: vec![PackageManager::Apt],
                ..Default::default()
            }),
        world
            .task("brew-update", ApplyBehavior::Converge)
            .only_on(TargetFilter {
                package_manager: vec![PackageManager::Brew],
                ..Default::default()
            }),
        world
            .task("git", ApplyBehavior::Converge)
            .after("apt-update")
            .after("brew-update"),
    ])
    .unwrap();

    let (on_apt, dropped) = graph.for_target(&target(Some(PackageManager::Apt), None)).unwrap();
    assert_eq!(names(&on_apt), vec!["apt-update", "git"]);
    assert_eq!(dropped, vec!["brew-update"]);
    assert_eq!(on_apt.dependencies_of("git"), ["apt-update".to_string()]);

    let (bare, dropped) = graph.for_target(&target(None, None)).unwrap();
    assert_eq!(names(&bare), vec!["git"]);
    assert_eq!(dropped.len(), 2);
}

#[tokio::test]
async fn orchestrator_follows_execution_order() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = TaskGraph::new(vec![
        world.task("prompt", ApplyBehavior::Converge).after("omz"),
        world.task("omz", ApplyBehavior::Converge).after("git"),
        world.task("git", ApplyBehavior::Converge),
    ])
    .unwrap();

    let record = with_timeout(Harness::new().run(&graph)).await;

    assert_eq!(world.applied(), vec!["git", "omz", "prompt"]);
    let order: Vec<&str> = record.outcomes.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(order, vec!["git", "omz", "prompt"]);
}

#[test]
fn cyclic_graph_is_rejected_before_anything_runs() {
    let world = FakeWorld::new();
    let harness = Harness::new();
    let result = TaskGraph::new(vec![
        world.task("a", ApplyBehavior::Converge).after("c"),
        world.task("b", ApplyBehavior::Converge).after("a"),
        world.task("c", ApplyBehavior::Converge).after("b"),
        world.task("loner", ApplyBehavior::Converge).after("loner"),
        world.task("fine", ApplyBehavior::Converge),
    ]);

    match result {
        Err(ConvergeError::CyclicDependency(members)) => {
            assert_eq!(members, vec!["a", "b", "c", "loner"]);
        }
        other => panic!("expected CyclicDependency, got {other:?}"),
    }
    assert!(world.journal().is_empty());
    assert_eq!(harness.runner.call_count(), 0);
}
