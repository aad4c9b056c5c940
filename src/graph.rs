//! Dependency graph snapshot and cycle detection using petgraph.
//!
//! Nodes are task ids. An edge `a -> b` means task `a` depends on task `b`
//! (b must finish or start before a, depending on the type). Only constraining
//! edges are loaded; `relates_to` associations never take part in cycle checks.
//!
//! Adding `t -> d` creates a cycle exactly when `t` is already reachable from
//! `d`, so a check is one breadth-first walk from `d`: O(V + E).

use std::collections::{HashMap, VecDeque};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fields::DependencyType;
use crate::task::{DependencyEdge, NewEdge, TaskId};

/// Directed graph of precedence edges for cycle checks and ordering.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<TaskId, DependencyType>,
    nodes: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from stored edges, skipping `relates_to`.
    pub fn from_edges<'a, I>(edges: I) -> Self
    where
        I: IntoIterator<Item = &'a DependencyEdge>,
    {
        let mut graph = Self::new();
        for edge in edges {
            graph.add_edge(edge.task_id, edge.depends_on_task_id, edge.dependency_type);
        }
        graph
    }

    fn node(&mut self, task_id: TaskId) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(&task_id) {
            return idx;
        }
        let idx = self.graph.add_node(task_id);
        self.nodes.insert(task_id, idx);
        idx
    }

    /// Add an edge to the snapshot. Non-constraining types are ignored.
    pub fn add_edge(&mut self, task_id: TaskId, depends_on_task_id: TaskId, dependency_type: DependencyType) {
        if !dependency_type.is_constraining() {
            return;
        }
        let from = self.node(task_id);
        let to = self.node(depends_on_task_id);
        self.graph.add_edge(from, to, dependency_type);
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Chain of existing dependencies that the candidate would close into a loop.
    ///
    /// The path starts at `depends_on_task_id` and ends at `task_id`; a
    /// self-loop yields a single-element path. `None` means no cycle.
    pub fn cycle_path(&self, task_id: TaskId, depends_on_task_id: TaskId) -> Option<Vec<TaskId>> {
        if task_id == depends_on_task_id {
            return Some(vec![task_id]);
        }
        let start = *self.nodes.get(&depends_on_task_id)?;
        let target = *self.nodes.get(&task_id)?;

        let mut came_from: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        came_from.insert(start, start);

        while let Some(current) = queue.pop_front() {
            if current == target {
                let mut path = vec![self.graph[current]];
                let mut cursor = current;
                while cursor != start {
                    cursor = came_from[&cursor];
                    path.push(self.graph[cursor]);
                }
                path.reverse();
                return Some(path);
            }
            for next in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if !came_from.contains_key(&next) {
                    came_from.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Whether adding `task_id -> depends_on_task_id` would close a cycle.
    pub fn would_create_cycle(&self, task_id: TaskId, depends_on_task_id: TaskId) -> bool {
        self.cycle_path(task_id, depends_on_task_id).is_some()
    }

    /// Reject a candidate edge that would close a cycle.
    pub fn check_candidate(&self, candidate: &NewEdge) -> Result<()> {
        if !candidate.dependency_type.is_constraining() {
            return Ok(());
        }
        match self.cycle_path(candidate.task_id, candidate.depends_on_task_id) {
            Some(path) => {
                debug!(
                    task_id = candidate.task_id,
                    depends_on = candidate.depends_on_task_id,
                    "candidate dependency closes a cycle"
                );
                Err(Error::CycleDetected {
                    task_id: candidate.task_id,
                    depends_on_task_id: candidate.depends_on_task_id,
                    path,
                })
            }
            None => Ok(()),
        }
    }

    /// Tasks in precedence order: every task comes after the tasks it depends on.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` if the stored edges already contain a cycle.
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        match toposort(&self.graph, None) {
            Ok(sorted) => Ok(sorted.into_iter().rev().map(|idx| self.graph[idx]).collect()),
            Err(cycle) => {
                let id = self.graph[cycle.node_id()];
                Err(Error::CycleDetected { task_id: id, depends_on_task_id: id, path: vec![id] })
            }
        }
    }

    /// Tasks this task directly depends on.
    pub fn predecessors(&self, task_id: TaskId) -> Vec<TaskId> {
        self.neighbours(task_id, Direction::Outgoing)
    }

    /// Tasks that directly depend on this task.
    pub fn successors(&self, task_id: TaskId) -> Vec<TaskId> {
        self.neighbours(task_id, Direction::Incoming)
    }

    fn neighbours(&self, task_id: TaskId, direction: Direction) -> Vec<TaskId> {
        let Some(&idx) = self.nodes.get(&task_id) else {
            return Vec::new();
        };
        let mut ids: Vec<TaskId> = self.graph.neighbors_directed(idx, direction).map(|n| self.graph[n]).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Pure check over an edge snapshot: would `candidate` create a cycle?
pub fn would_create_cycle(edges: &[DependencyEdge], candidate: &NewEdge) -> bool {
    if !candidate.dependency_type.is_constraining() {
        return false;
    }
    DependencyGraph::from_edges(edges).would_create_cycle(candidate.task_id, candidate.depends_on_task_id)
}
