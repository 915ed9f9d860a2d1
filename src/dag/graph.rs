// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{debug, info};

use crate::errors::{ConvergeError, Result};
use crate::exec::TargetInfo;
use crate::task::{Task, TaskName};

/// The full set of tasks for a run plus their dependency edges.
///
/// Node `i` of the inner graph is the `i`-th declared task. Edges point from
/// a dependency to its dependent. The graph is only ever borrowed by the
/// orchestrator, so it cannot change mid-run.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<TaskName, usize>,
    graph: DiGraph<usize, ()>,
}

impl TaskGraph {
    /// Build a graph from tasks in declaration order.
    ///
    /// Fails on duplicate names, references to undeclared tasks, and cycles.
    pub fn new(tasks: Vec<Task>) -> Result<Self> {
        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.name.clone(), i).is_some() {
                return Err(ConvergeError::ConfigError(format!(
                    "task '{}' is declared more than once",
                    task.name
                )));
            }
        }

        let mut graph = DiGraph::with_capacity(tasks.len(), 0);
        for i in 0..tasks.len() {
            graph.add_node(i);
        }

        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.deps {
                let Some(&d) = index.get(dep) else {
                    return Err(ConvergeError::UnknownTask(format!(
                        "'{}' (required by '{}')",
                        dep, task.name
                    )));
                };
                graph.update_edge(NodeIndex::new(d), NodeIndex::new(i), ());
            }
        }

        let this = Self {
            tasks,
            index,
            graph,
        };

        let cycle = this.cycle_members();
        if !cycle.is_empty() {
            return Err(ConvergeError::CyclicDependency(cycle));
        }

        debug!(tasks = this.tasks.len(), "task graph built");
        Ok(this)
    }

    /// Names of every task sitting on a dependency cycle, in declaration order.
    fn cycle_members(&self) -> Vec<TaskName> {
        let mut members: Vec<usize> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0])
            })
            .flatten()
            .map(|n| n.index())
            .collect();
        members.sort_unstable();
        members
            .into_iter()
            .map(|i| self.tasks[i].name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.get(name).map(|t| t.deps.as_slice()).unwrap_or(&[])
    }

    /// Immediate dependents of a task, in declaration order.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        let Some(&i) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(i), Direction::Outgoing)
            .map(|n| n.index())
            .collect();
        out.sort_unstable();
        out.into_iter().map(|j| self.tasks[j].name.as_str()).collect()
    }

    /// Topological order (Kahn's algorithm). Among tasks that are ready at
    /// the same time, the earliest declared goes first.
    pub fn execution_order(&self) -> Vec<&Task> {
        let mut in_degree: Vec<usize> = (0..self.tasks.len())
            .map(|i| {
                self.graph
                    .neighbors_directed(NodeIndex::new(i), Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(&self.tasks[i]);
            for next in self
                .graph
                .neighbors_directed(NodeIndex::new(i), Direction::Outgoing)
            {
                let j = next.index();
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }
        order
    }

    /// Sub-graph containing the requested tasks and everything they
    /// (transitively) depend on.
    pub fn restrict_to(&self, names: &[String]) -> Result<TaskGraph> {
        let mut keep: HashSet<usize> = HashSet::new();
        let mut queue: VecDeque<usize> = VecDeque::new();

        for name in names {
            let &i = self
                .index
                .get(name)
                .ok_or_else(|| ConvergeError::UnknownTask(format!("'{name}' (requested by --only)")))?;
            queue.push_back(i);
        }

        while let Some(i) = queue.pop_front() {
            if !keep.insert(i) {
                continue;
            }
            queue.extend(
                self.graph
                    .neighbors_directed(NodeIndex::new(i), Direction::Incoming)
                    .map(|n| n.index()),
            );
        }

        let tasks: Vec<Task> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(i, _)| keep.contains(i))
            .map(|(_, t)| t.clone())
            .collect();

        info!(
            requested = ?names,
            selected = ?tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "restricted task graph"
        );
        TaskGraph::new(tasks)
    }

    /// Drop tasks whose `only_on` filter does not match `target`.
    ///
    /// Edges to dropped tasks are removed: a dependency that does not apply
    /// to this machine cannot hold anything up. Returns the new graph and
    /// the names that were dropped.
    pub fn for_target(&self, target: &TargetInfo) -> Result<(TaskGraph, Vec<TaskName>)> {
        let (kept, dropped): (Vec<&Task>, Vec<&Task>) =
            self.tasks.iter().partition(|t| t.only_on.matches(target));

        let dropped: Vec<TaskName> = dropped.into_iter().map(|t| t.name.clone()).collect();
        if !dropped.is_empty() {
            info!(?dropped, "tasks not applicable to this target");
        }

        let tasks = kept
            .into_iter()
            .cloned()
            .map(|mut t| {
                t.deps.retain(|d| !dropped.contains(d));
                t
            })
            .collect();

        Ok((TaskGraph::new(tasks)?, dropped))
    }
}
