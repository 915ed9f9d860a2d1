// src/engine/runlog.rs

//! Append-only run log.
//!
//! One line per event, tab separated:
//!
//! ```text
//! 2026-10-16T09:12:44.120Z	git	probe	unsatisfied
//! 2026-10-16T09:12:51.902Z	git	apply	ok
//! 2026-10-16T09:12:51.940Z	git	verify	applied
//! ```
//!
//! An optional fifth column carries the proximate cause. Every line is
//! written and flushed to disk before the orchestrator moves on, so the file
//! reflects all completed work even if the process dies mid-run. The last
//! event of each task carries its final outcome label.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, error};

use crate::engine::{RunState, TaskOutcome};
use crate::task::TaskName;
use crate::types::Phase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEvent {
    pub timestamp: DateTime<Utc>,
    pub task: TaskName,
    pub phase: Phase,
    pub outcome: String,
    pub detail: Option<String>,
}

impl RunEvent {
    pub fn to_line(&self) -> String {
        let ts = self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        match &self.detail {
            Some(detail) => format!(
                "{ts}\t{}\t{}\t{}\t{}",
                self.task,
                self.phase,
                self.outcome,
                sanitize(detail)
            ),
            None => format!("{ts}\t{}\t{}\t{}", self.task, self.phase, self.outcome),
        }
    }

    /// Parse a line written by [`RunEvent::to_line`].
    pub fn parse_line(line: &str) -> Option<RunEvent> {
        let mut fields = line.splitn(5, '\t');
        let timestamp = DateTime::parse_from_rfc3339(fields.next()?)
            .ok()?
            .with_timezone(&Utc);
        let task = fields.next()?.to_string();
        let phase = fields.next()?.parse().ok()?;
        let outcome = fields.next()?.to_string();
        let detail = fields.next().map(str::to_string);
        Some(RunEvent {
            timestamp,
            task,
            phase,
            outcome,
            detail,
        })
    }
}

fn sanitize(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

/// Read every parseable event from a run log file.
pub fn read_events(path: &Path) -> io::Result<Vec<RunEvent>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents.lines().filter_map(RunEvent::parse_line).collect())
}

/// Event sink owned by the orchestrator for the duration of a run.
#[derive(Debug)]
pub struct RunLog {
    started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    file: Option<(PathBuf, File)>,
    write_failures: usize,
}

impl RunLog {
    /// Log kept in memory only.
    pub fn in_memory() -> Self {
        Self {
            started_at: Utc::now(),
            events: Vec::new(),
            file: None,
            write_failures: 0,
        }
    }

    /// Log that also appends to `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = ?path, "run log opened");
        Ok(Self {
            started_at: Utc::now(),
            events: Vec::new(),
            file: Some((path.to_path_buf(), file)),
            write_failures: 0,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(p, _)| p.as_path())
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    /// Events that were kept in memory but never reached the file.
    pub fn write_failures(&self) -> usize {
        self.write_failures
    }

    pub fn record(&mut self, task: &str, phase: Phase, outcome: &str, detail: Option<String>) {
        let event = RunEvent {
            timestamp: Utc::now(),
            task: task.to_string(),
            phase,
            outcome: outcome.to_string(),
            detail,
        };

        if let Some((path, file)) = self.file.as_mut() {
            if let Err(e) = write_durably(file, &event.to_line()) {
                self.write_failures += 1;
                error!(path = ?path, error = %e, "failed to write run log entry");
            }
        }
        self.events.push(event);
    }

    /// Seal the log into an immutable record.
    pub fn finish(
        self,
        state: RunState,
        outcomes: Vec<(TaskName, TaskOutcome)>,
        dry_run: bool,
    ) -> RunRecord {
        RunRecord {
            started_at: self.started_at,
            finished_at: Utc::now(),
            state,
            dry_run,
            events: self.events,
            outcomes,
            log_path: self.file.map(|(p, _)| p),
            log_write_failures: self.write_failures,
        }
    }
}

fn write_durably(file: &mut File, line: &str) -> io::Result<()> {
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    file.write_all(buf.as_bytes())?;
    file.flush()?;
    file.sync_data()
}

/// Everything that happened in one invocation. Read-only once built.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: RunState,
    pub dry_run: bool,
    pub events: Vec<RunEvent>,
    /// Final outcome per task, in execution order.
    pub outcomes: Vec<(TaskName, TaskOutcome)>,
    pub log_path: Option<PathBuf>,
    /// Entries missing from `log_path` because the write failed.
    pub log_write_failures: usize,
}

impl RunRecord {
    pub fn outcome_of(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, o)| o)
    }

    pub fn events_for<'a>(&'a self, task: &'a str) -> impl Iterator<Item = &'a RunEvent> + 'a {
        self.events.iter().filter(move |e| e.task == task)
    }
}
