// src/exec/mod.rs

//! External command execution and target identity.
//!
//! - [`runner`] provides the `CommandRunner` trait, the only way the engine
//!   touches external processes, plus the production `ShellCommandRunner`.
//!   Tests swap in a scripted fake.
//! - [`target`] detects which package manager and shell the running target
//!   has, so that only relevant tasks and probes are used.

pub mod runner;
pub mod target;

pub use runner::{CommandError, CommandOutput, CommandRunner, CommandSpec, ShellCommandRunner};
pub use target::TargetInfo;
