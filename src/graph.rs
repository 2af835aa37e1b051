//! Getter dependency graph.
//!
//! Every store and getter keeps a list of the getters that read it. When a
//! node changes, propagation walks the reachable getters in topological order
//! so each getter refreshes once, after all of its upstream getters have
//! settled, even when the graph has diamonds.
//!
//! The graph is acyclic by construction: a getter can only depend on nodes
//! that already exist, and getter ids are unique.

use crate::types::NodeKey;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Downstream edges from stores and getters to dependent getters.
pub struct DependencyGraph {
    downstream: RwLock<HashMap<NodeKey, Vec<String>>>,
}

impl DependencyGraph {
    /// Create a graph with no edges.
    pub fn new() -> Self {
        Self {
            downstream: RwLock::new(HashMap::new()),
        }
    }

    /// Record that `getter` reads `upstream`.
    pub fn link(&self, upstream: NodeKey, getter: &str) {
        let mut downstream = self.downstream.write();
        let dependents = downstream.entry(upstream).or_default();
        if !dependents.iter().any(|g| g == getter) {
            dependents.push(getter.to_string());
        }
    }

    /// Drop every edge into and out of a getter.
    pub fn unlink_getter(&self, getter: &str) {
        let mut downstream = self.downstream.write();
        downstream.remove(&NodeKey::getter(getter));
        for dependents in downstream.values_mut() {
            dependents.retain(|g| g != getter);
        }
        downstream.retain(|_, dependents| !dependents.is_empty());
    }

    /// Getters reading `node` directly.
    pub fn dependents_of(&self, node: &NodeKey) -> Vec<String> {
        self.downstream.read().get(node).cloned().unwrap_or_default()
    }

    /// Every getter reachable from `from`, upstream getters first.
    pub fn propagation_order(&self, from: &NodeKey) -> Vec<String> {
        let downstream = self.downstream.read();
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        Self::visit(&downstream, from, &mut visited, &mut order);
        order.reverse();
        order
    }

    fn visit(
        downstream: &HashMap<NodeKey, Vec<String>>,
        node: &NodeKey,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        let Some(dependents) = downstream.get(node) else {
            return;
        };

        for getter in dependents {
            if visited.insert(getter.clone()) {
                Self::visit(downstream, &NodeKey::getter(getter.as_str()), visited, order);
                order.push(getter.clone());
            }
        }
    }

    /// Number of upstream-to-getter edges.
    pub fn edge_count(&self) -> usize {
        self.downstream.read().values().map(Vec::len).sum()
    }

    /// Remove every edge.
    pub fn clear(&self) {
        self.downstream.write().clear();
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
