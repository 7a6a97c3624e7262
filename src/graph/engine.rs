//! File-level dependency graph.
//!
//! Uses petgraph as an arena: files are nodes addressed by their normalized
//! path, edges reference node indexes. Cycles are ordinary data here.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A resolved file-to-file dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

/// Directed graph of files and the files they depend on.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    /// Index: normalized path -> node index.
    file_index: HashMap<String, NodeIndex>,
    edge_set: HashSet<(NodeIndex, NodeIndex)>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file node. Returns the existing index when already present.
    pub fn add_file(&mut self, path: &str) -> NodeIndex {
        if let Some(&idx) = self.file_index.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(path.to_string());
        self.file_index.insert(path.to_string(), idx);
        idx
    }

    /// Add `source -> target`, creating both nodes. Returns false for
    /// duplicates and for a file depending on itself.
    pub fn add_edge(&mut self, source: &str, target: &str) -> bool {
        let from = self.add_file(source);
        if source == target {
            return false;
        }
        let to = self.add_file(target);
        if !self.edge_set.insert((from, to)) {
            return false;
        }
        self.graph.add_edge(from, to, ());
        true
    }

    pub fn contains(&self, path: &str) -> bool {
        self.file_index.contains_key(path)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All files, sorted.
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.file_index.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// All edges, sorted by (source, target).
    pub fn edges(&self) -> Vec<GraphEdge> {
        let mut edges: Vec<GraphEdge> = self
            .edge_set
            .iter()
            .map(|&(from, to)| GraphEdge {
                source: self.graph[from].clone(),
                target: self.graph[to].clone(),
            })
            .collect();
        edges.sort();
        edges
    }

    /// Files `path` depends on directly.
    pub fn dependencies_of(&self, path: &str) -> Vec<String> {
        self.neighbors(path, Direction::Outgoing)
    }

    /// Files that depend on `path` directly.
    pub fn dependents_of(&self, path: &str) -> Vec<String> {
        self.neighbors(path, Direction::Incoming)
    }

    fn neighbors(&self, path: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.file_index.get(path) else {
            return Vec::new();
        };
        let mut found: Vec<String> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        found.sort();
        found.dedup();
        found
    }

    /// Strongly connected components with more than one file, each sorted,
    /// ordered by their first member.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut files: Vec<String> =
                    component.into_iter().map(|n| self.graph[n].clone()).collect();
                files.sort();
                files
            })
            .collect();
        cycles.sort();
        cycles
    }

    pub fn has_cycles(&self) -> bool {
        tarjan_scc(&self.graph).iter().any(|c| c.len() > 1)
    }
}
