// src/engine/confirm.rs

//! Operator confirmation before applying selected tasks.

use std::io::{self, BufRead, Write};

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;

/// Asked synchronously before a task with a `confirm` prompt is applied.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, task: &str, prompt: &str) -> bool;
}

/// Fixed answer. Used for `--yes`, non-interactive stdin, and tests.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirmer for AutoConfirm {
    fn confirm(&self, _task: &str, _prompt: &str) -> bool {
        self.0
    }
}

/// Interactive y/N prompt on stderr, answer read from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, task: &str, prompt: &str) -> bool {
        run_blocking(|| ask(task, prompt, &mut io::stdin().lock(), &mut io::stderr()))
    }
}

/// Write the prompt to `output` and read one answer line from `input`.
/// A read error or end of input counts as no.
pub fn ask(task: &str, prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    let _ = write!(output, "[{task}] {prompt} [y/N] ");
    let _ = output.flush();

    let mut answer = String::new();
    if let Err(e) = input.read_line(&mut answer) {
        warn!(task, error = %e, "failed to read confirmation; treating as no");
        return false;
    }
    parse_answer(&answer)
}

/// Run a blocking closure from inside the orchestrator.
///
/// On a multi-thread runtime the worker is handed off with
/// `block_in_place`, so timers and the Ctrl-C listener keep running while
/// the operator types. `block_in_place` panics on a current-thread
/// runtime, so there (and outside any runtime) `f` is called directly.
pub fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// `y`/`yes` (any case) is a yes; everything else, including empty, is no.
pub fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
