mod common;
use crate::common::fakes::{ApplyBehavior, FakeWorld, Harness};
use crate::common::{init_tracing, with_timeout};

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use converge::dag::TaskGraph;
use converge::engine::confirm::{ask, parse_answer, run_blocking};
use converge::engine::{Confirmer, SkipReason, TaskOutcome};

/// Reads answers from a fixed buffer through the same blocking path the
/// interactive confirmer uses.
struct BufferedConfirmer {
    input: Mutex<Cursor<Vec<u8>>>,
    output: Mutex<Vec<u8>>,
}

impl BufferedConfirmer {
    fn new(answers: &str) -> Self {
        Self {
            input: Mutex::new(Cursor::new(answers.as_bytes().to_vec())),
            output: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> String {
        String::from_utf8(self.output.lock().unwrap().clone()).unwrap()
    }
}

impl Confirmer for BufferedConfirmer {
    fn confirm(&self, task: &str, prompt: &str) -> bool {
        run_blocking(|| {
            let mut input = self.input.lock().unwrap();
            let mut output = self.output.lock().unwrap();
            ask(task, prompt, &mut *input, &mut *output)
        })
    }
}

fn confirm_graph(world: &FakeWorld) -> TaskGraph {
    TaskGraph::new(vec![
        world
            .task("chsh", ApplyBehavior::Converge)
            .confirm("Change login shell to zsh?"),
        world
            .task("docker", ApplyBehavior::Converge)
            .confirm("Install docker?"),
    ])
    .unwrap()
}

#[test]
fn answers() {
    for yes in ["y", "Y", "yes", "YES\n", "  yes  "] {
        assert!(parse_answer(yes), "{yes:?}");
    }
    for no in ["", "\n", "n", "no", "yep", "y e s"] {
        assert!(!parse_answer(no), "{no:?}");
    }
}

#[test]
fn ask_writes_the_prompt_and_reads_one_line() {
    let mut input = Cursor::new(b"yes\nno\n".to_vec());
    let mut output = Vec::new();

    assert!(ask("chsh", "Change shell?", &mut input, &mut output));
    assert!(!ask("chsh", "Change shell?", &mut input, &mut output));
    // End of input is a no.
    assert!(!ask("chsh", "Change shell?", &mut input, &mut output));

    let written = String::from_utf8(output).unwrap();
    assert_eq!(written.matches("[chsh] Change shell? [y/N] ").count(), 3);
}

#[test]
fn blocking_outside_a_runtime_runs_inline() {
    assert_eq!(run_blocking(|| 7), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prompts_on_a_multi_thread_runtime() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = confirm_graph(&world);
    let confirmer = Arc::new(BufferedConfirmer::new("y\nn\n"));

    let mut harness = Harness::new();
    harness.confirmer = confirmer.clone();
    let record = with_timeout(harness.run(&graph)).await;

    assert_eq!(record.outcome_of("chsh"), Some(&TaskOutcome::Applied));
    assert_eq!(
        record.outcome_of("docker"),
        Some(&TaskOutcome::Skipped(SkipReason::Declined))
    );
    assert!(confirmer.prompts().contains("[docker] Install docker? [y/N] "));
}

#[tokio::test]
async fn prompts_on_a_current_thread_runtime() {
    init_tracing();
    let world = FakeWorld::new();
    let graph = confirm_graph(&world);
    let confirmer = Arc::new(BufferedConfirmer::new("\nyes\n"));

    let mut harness = Harness::new();
    harness.confirmer = confirmer.clone();
    let record = with_timeout(harness.run(&graph)).await;

    assert_eq!(
        record.outcome_of("chsh"),
        Some(&TaskOutcome::Skipped(SkipReason::Declined))
    );
    assert_eq!(record.outcome_of("docker"), Some(&TaskOutcome::Applied));
    assert_eq!(world.applied(), vec!["docker"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn other_tasks_progress_while_waiting_for_an_answer() {
    init_tracing();
    let done = Arc::new(AtomicBool::new(false));

    let saw_progress = run_blocking(|| {
        let flag = Arc::clone(&done);
        tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        let deadline = Instant::now() + Duration::from_secs(5);
        while !done.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        done.load(Ordering::SeqCst)
    });

    assert!(saw_progress, "spawned work ran while the worker was blocked");
}
