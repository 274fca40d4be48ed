//! Dependency graph over catalog indices
//!
//! Nodes are declaration indices. An edge `from -> to` means `from` must be
//! finalized before `to` is evaluated; refresh edges additionally deliver a
//! refresh event when `from` changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A normalized ordering edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    /// Set for notify/subscribe relations
    pub refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Adjacency lists for the catalog's edges
#[derive(Debug, Clone, Default)]
pub struct Graph {
    outgoing: Vec<Vec<Edge>>,
    incoming: Vec<Vec<usize>>,
}

impl Graph {
    /// Build a graph with `node_count` nodes. Edge endpoints must be in range.
    pub fn new(node_count: usize, edges: impl IntoIterator<Item = Edge>) -> Self {
        let mut outgoing = vec![Vec::new(); node_count];
        let mut incoming = vec![Vec::new(); node_count];
        for edge in edges {
            debug_assert!(edge.from < node_count && edge.to < node_count);
            outgoing[edge.from].push(edge);
            incoming[edge.to].push(edge.from);
        }
        Self { outgoing, incoming }
    }

    pub fn len(&self) -> usize {
        self.outgoing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.outgoing.iter().flatten()
    }

    pub fn outgoing(&self, node: usize) -> &[Edge] {
        &self.outgoing[node]
    }

    /// Nodes with an edge into `node`
    pub fn predecessors(&self, node: usize) -> &[usize] {
        &self.incoming[node]
    }

    /// Targets of refresh edges leaving `node`
    pub fn refresh_targets(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.outgoing[node]
            .iter()
            .filter(|e| e.refresh)
            .map(|e| e.to)
    }

    /// First cycle found by depth-first search, as nodes in path order.
    ///
    /// A self-loop is reported as a one-node cycle. The search keeps its own
    /// stack of `(node, next edge)` frames, so chain depth is not limited by
    /// the thread stack.
    pub fn find_cycle(&self) -> Option<Vec<usize>> {
        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut path: Vec<(usize, usize)> = Vec::new();

        for start in 0..self.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::OnPath;
            path.push((start, 0));

            while let Some(frame) = path.last_mut() {
                let (node, next) = *frame;
                let Some(edge) = self.outgoing[node].get(next) else {
                    marks[node] = Mark::Done;
                    path.pop();
                    continue;
                };
                frame.1 += 1;
                match marks[edge.to] {
                    Mark::OnPath => {
                        let at = path.iter().position(|&(n, _)| n == edge.to)?;
                        return Some(path[at..].iter().map(|&(n, _)| n).collect());
                    }
                    Mark::Unvisited => {
                        marks[edge.to] = Mark::OnPath;
                        path.push((edge.to, 0));
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }

    /// Kahn's algorithm; among ready nodes the lowest index goes first, so
    /// unconstrained nodes keep declaration order. `None` if there is a cycle.
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        let mut indegree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.len()).filter(|&n| indegree[n] == 0).collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for edge in &self.outgoing[node] {
                indegree[edge.to] -= 1;
                if indegree[edge.to] == 0 {
                    ready.insert(edge.to);
                }
            }
        }

        (order.len() == self.len()).then_some(order)
    }
}
