//! Transient resolution graph.
//!
//! Built for one caching request: nodes are `(scope, identifier)` pairs,
//! edges point from a dependent to its dependency. Instantiation peels off
//! roots (nodes without outgoing edges) until the graph is empty. When no
//! root is left but nodes remain, the rest contains a cycle and
//! [`ResolutionGraph::find_cycle`] recovers it.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

struct Node<K, D> {
    data: D,
    edges: Vec<K>,
}

/// Directed graph with insertion-ordered nodes.
pub(crate) struct ResolutionGraph<K, D> {
    nodes: HashMap<K, Node<K, D>>,
    order: Vec<K>,
}

impl<K, D> ResolutionGraph<K, D>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Inserts a node. Returns `false` if it was already present.
    pub fn insert_node(&mut self, key: K, data: D) -> bool {
        if self.nodes.contains_key(&key) {
            return false;
        }

        self.order.push(key.clone());
        self.nodes.insert(key, Node { data, edges: Vec::new() });
        true
    }

    /// Adds `from → to`. Both nodes must exist; duplicates are ignored.
    pub fn insert_edge(&mut self, from: &K, to: K) {
        if !self.nodes.contains_key(&to) {
            return;
        }
        if let Some(node) = self.nodes.get_mut(from) {
            if !node.edges.contains(&to) {
                node.edges.push(to);
            }
        }
    }

    /// Removes a node and every edge pointing at it.
    pub fn remove_node(&mut self, key: &K) {
        if self.nodes.remove(key).is_none() {
            return;
        }

        self.order.retain(|known| known != key);
        for node in self.nodes.values_mut() {
            node.edges.retain(|edge| edge != key);
        }
    }

    /// Nodes without outgoing edges, in insertion order.
    pub fn roots(&self) -> Vec<K> {
        self.order
            .iter()
            .filter(|key| self.nodes.get(*key).is_some_and(|node| node.edges.is_empty()))
            .cloned()
            .collect()
    }

    pub fn data(&self, key: &K) -> Option<&D> {
        self.nodes.get(key).map(|node| &node.data)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Recovers a cycle, preferring one reachable from `start`.
    ///
    /// The returned path begins at `start` when `start` reaches the cycle
    /// and ends at the node that closes it.
    pub fn find_cycle(&self, start: &K) -> Option<Vec<K>> {
        let mut search = CycleSearch {
            graph: self,
            visiting: HashSet::new(),
            done: HashSet::new(),
            path: Vec::new(),
        };

        if self.nodes.contains_key(start) {
            if let Some(cycle) = search.visit(start) {
                return Some(cycle);
            }
        }

        for key in &self.order {
            if let Some(cycle) = search.visit(key) {
                return Some(cycle);
            }
        }

        None
    }
}

struct CycleSearch<'g, K, D> {
    graph: &'g ResolutionGraph<K, D>,
    /// Currently on the DFS stack
    visiting: HashSet<K>,
    /// Fully explored, known not to lead into a cycle
    done: HashSet<K>,
    /// Current DFS path (for reporting)
    path: Vec<K>,
}

impl<K, D> CycleSearch<'_, K, D>
where
    K: Clone + Eq + Hash,
{
    fn visit(&mut self, key: &K) -> Option<Vec<K>> {
        if self.done.contains(key) {
            return None;
        }

        // Back on the stack: the path closes a cycle.
        if self.visiting.contains(key) {
            let mut chain = self.path.clone();
            chain.push(key.clone());
            return Some(chain);
        }

        let edges = self.graph.nodes.get(key).map(|node| node.edges.clone())?;

        self.visiting.insert(key.clone());
        self.path.push(key.clone());

        for edge in &edges {
            if let Some(cycle) = self.visit(edge) {
                return Some(cycle);
            }
        }

        self.path.pop();
        self.visiting.remove(key);
        self.done.insert(key.clone());
        None
    }
}
