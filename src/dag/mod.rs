// src/dag/mod.rs

//! Task dependency graph.
//!
//! [`graph`] holds the immutable set of tasks for a run and produces a
//! deterministic execution order, detecting cycles up front.

pub mod graph;

pub use graph::TaskGraph;
