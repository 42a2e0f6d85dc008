//! Schema Composition Graph
//!
//! Arena of schema keys connected by parent -> child composition edges,
//! backed by petgraph. Cycle checks are traversals over this index rather
//! than pointer chases through schema values.

pub mod loader;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

pub use loader::{load_from_directory, load_into_registry, order_for_save};

/// Canonical schema identifier
pub type SchemaKey = String;

/// Key-addressed composition graph; edges point from parent to child
#[derive(Debug, Default, Clone)]
pub struct CompositionGraph {
    graph: StableDiGraph<SchemaKey, ()>,
    node_indices: HashMap<SchemaKey, NodeIndex>,
}

impl CompositionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.node_indices.contains_key(key)
    }

    fn ensure_node(&mut self, key: &str) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(key) {
            return idx;
        }
        let idx = self.graph.add_node(key.to_string());
        self.node_indices.insert(key.to_string(), idx);
        idx
    }

    /// Replace the outgoing edges of `parent` with edges to `children`
    pub fn set_children<'a>(&mut self, parent: &str, children: impl IntoIterator<Item = &'a str>) {
        let parent_idx = self.ensure_node(parent);
        let stale: Vec<_> = self
            .graph
            .edges_directed(parent_idx, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        for edge in stale {
            self.graph.remove_edge(edge);
        }

        let mut added = HashSet::new();
        for child in children {
            if !added.insert(child) {
                continue;
            }
            let child_idx = self.ensure_node(child);
            self.graph.add_edge(parent_idx, child_idx, ());
        }
    }

    /// Immediate children of a schema
    pub fn children_of(&self, key: &str) -> Vec<&SchemaKey> {
        self.neighbors(key, Direction::Outgoing)
    }

    /// Immediate parents of a schema
    pub fn parents_of(&self, key: &str) -> Vec<&SchemaKey> {
        self.neighbors(key, Direction::Incoming)
    }

    fn neighbors(&self, key: &str, direction: Direction) -> Vec<&SchemaKey> {
        let Some(&idx) = self.node_indices.get(key) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n))
            .collect()
    }

    /// Every schema that transitively composes `key`
    pub fn ancestors(&self, key: &str) -> Vec<SchemaKey> {
        self.closure(key, Direction::Incoming)
    }

    /// Every schema transitively composed into `key`
    pub fn descendants(&self, key: &str) -> Vec<SchemaKey> {
        self.closure(key, Direction::Outgoing)
    }

    /// Transitive closure in one direction, nearest first, excluding the start
    fn closure(&self, key: &str, direction: Direction) -> Vec<SchemaKey> {
        let Some(&start_idx) = self.node_indices.get(key) else {
            return Vec::new();
        };

        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = std::collections::VecDeque::from([start_idx]);
        visited.insert(start_idx);

        while let Some(node_idx) = queue.pop_front() {
            for next in self.graph.neighbors_directed(node_idx, direction) {
                if !visited.insert(next) {
                    continue;
                }
                if let Some(node_key) = self.graph.node_weight(next) {
                    result.push(node_key.clone());
                }
                queue.push_back(next);
            }
        }

        result
    }
}
