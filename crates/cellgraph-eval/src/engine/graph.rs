//! Generic directed graph with Kahn topological ordering.
//!
//! An edge `from -> to` means "`to` depends on `from`". Reverse adjacency is
//! kept alongside so predecessors are O(1) to find.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

/// Graph invariant violations. These signal a bug in the caller, not bad
/// user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownNode(String),
    MalformedRange(String),
    /// A vertex was entered for evaluation twice in one pass.
    Reentrant(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnknownNode(n) => write!(f, "unknown graph node {n}"),
            GraphError::MalformedRange(r) => write!(f, "malformed range {r}"),
            GraphError::Reentrant(n) => write!(f, "vertex {n} re-entered during evaluation"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Result of a topological sort.
///
/// `cycled` holds every node that was never emitted: nodes on a cycle and
/// everything downstream of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopSort<N> {
    pub sorted: Vec<N>,
    pub cycled: Vec<N>,
}

#[derive(Debug, Clone)]
pub struct Graph<N> {
    nodes: FxHashSet<N>,
    edges: FxHashMap<N, FxHashSet<N>>,
    reverse: FxHashMap<N, FxHashSet<N>>,
}

impl<N> Default for Graph<N> {
    fn default() -> Self {
        Self {
            nodes: FxHashSet::default(),
            edges: FxHashMap::default(),
            reverse: FxHashMap::default(),
        }
    }
}

impl<N> Graph<N>
where
    N: Copy + Eq + Hash + Ord + fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; existing edges of `node` are preserved.
    pub fn add_node(&mut self, node: N) {
        if self.nodes.insert(node) {
            self.edges.insert(node, FxHashSet::default());
            self.reverse.insert(node, FxHashSet::default());
        }
    }

    pub fn has_node(&self, node: N) -> bool {
        self.nodes.contains(&node)
    }

    /// Add `from -> to`. Duplicate edges collapse.
    pub fn add_edge(&mut self, from: N, to: N) -> Result<(), GraphError> {
        if !self.nodes.contains(&from) {
            return Err(GraphError::UnknownNode(format!("{from:?}")));
        }
        if !self.nodes.contains(&to) {
            return Err(GraphError::UnknownNode(format!("{to:?}")));
        }
        self.edges.entry(from).or_default().insert(to);
        self.reverse.entry(to).or_default().insert(from);
        Ok(())
    }

    pub fn remove_edge(&mut self, from: N, to: N) -> bool {
        let removed = self
            .edges
            .get_mut(&from)
            .map(|s| s.remove(&to))
            .unwrap_or(false);
        if let Some(preds) = self.reverse.get_mut(&to) {
            preds.remove(&from);
        }
        removed
    }

    pub fn has_edge(&self, from: N, to: N) -> bool {
        self.edges.get(&from).is_some_and(|s| s.contains(&to))
    }

    /// Targets of `node`; `None` if the node is unknown.
    pub fn adjacent_nodes(&self, node: N) -> Option<&FxHashSet<N>> {
        self.edges.get(&node)
    }

    /// Sources of edges into `node`; `None` if the node is unknown.
    pub fn predecessors(&self, node: N) -> Option<&FxHashSet<N>> {
        self.reverse.get(&node)
    }

    pub fn dependents_count(&self, node: N) -> usize {
        self.edges.get(&node).map_or(0, |s| s.len())
    }

    /// Remove `node` and every incident edge. Returns the former targets.
    pub fn remove_node(&mut self, node: N) -> Result<FxHashSet<N>, GraphError> {
        if !self.nodes.remove(&node) {
            return Err(GraphError::UnknownNode(format!("{node:?}")));
        }
        let targets = self.edges.remove(&node).unwrap_or_default();
        for t in &targets {
            if let Some(preds) = self.reverse.get_mut(t) {
                preds.remove(&node);
            }
        }
        if let Some(sources) = self.reverse.remove(&node) {
            for s in sources {
                if let Some(out) = self.edges.get_mut(&s) {
                    out.remove(&node);
                }
            }
        }
        Ok(targets)
    }

    /// Drop every incoming edge of `node`, keeping the node and its targets.
    pub fn remove_incoming(&mut self, node: N) -> FxHashSet<N> {
        let sources = self
            .reverse
            .get_mut(&node)
            .map(std::mem::take)
            .unwrap_or_default();
        for s in &sources {
            if let Some(out) = self.edges.get_mut(s) {
                out.remove(&node);
            }
        }
        sources
    }

    pub fn nodes(&self) -> impl Iterator<Item = N> + '_ {
        self.nodes.iter().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|s| s.len()).sum()
    }

    /// Kahn's algorithm over the whole graph.
    pub fn topological_sort(&self) -> TopSort<N> {
        self.kahn(|_| true)
    }

    /// Kahn's algorithm over the subgraph induced by `subset`.
    pub fn topological_sort_of(&self, subset: &FxHashSet<N>) -> TopSort<N> {
        self.kahn(|n| subset.contains(n))
    }

    fn kahn(&self, include: impl Fn(&N) -> bool) -> TopSort<N> {
        let mut in_degree: FxHashMap<N, usize> = FxHashMap::default();
        for &node in self.nodes.iter().filter(|n| include(n)) {
            let degree = self
                .reverse
                .get(&node)
                .map_or(0, |preds| preds.iter().filter(|p| include(p)).count());
            in_degree.insert(node, degree);
        }

        // Lowest id first, so the order is reproducible.
        let mut frontier: BinaryHeap<Reverse<N>> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| Reverse(*n))
            .collect();

        let mut sorted = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(node)) = frontier.pop() {
            sorted.push(node);
            if let Some(targets) = self.edges.get(&node) {
                for t in targets {
                    if let Some(d) = in_degree.get_mut(t) {
                        *d -= 1;
                        if *d == 0 {
                            frontier.push(Reverse(*t));
                        }
                    }
                }
            }
        }

        let mut cycled: Vec<N> = in_degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(n, _)| n)
            .collect();
        cycled.sort_unstable();
        TopSort { sorted, cycled }
    }

    /// Every node reachable from `seeds`, seeds included.
    pub fn reachable_from(&self, seeds: impl IntoIterator<Item = N>) -> FxHashSet<N> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<N> = seeds.into_iter().filter(|n| self.has_node(*n)).collect();
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            if let Some(targets) = self.edges.get(&node) {
                stack.extend(targets.iter().copied().filter(|t| !seen.contains(t)));
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn graph(n: u32, edges: &[(u32, u32)]) -> Graph<u32> {
        let mut g = Graph::new();
        for i in 0..n {
            g.add_node(i);
        }
        for &(a, b) in edges {
            g.add_edge(a, b).unwrap();
        }
        g
    }

    #[test]
    fn unknown_endpoints_are_rejected() {
        let mut g = graph(1, &[]);
        assert_eq!(g.add_edge(0, 7), Err(GraphError::UnknownNode("7".into())));
        assert!(g.adjacent_nodes(7).is_none());
    }

    #[test]
    fn add_node_keeps_edges_and_duplicates_collapse() {
        let mut g = graph(2, &[(0, 1), (0, 1)]);
        g.add_node(0);
        assert_eq!(g.edge_count(), 1);
        assert!(g.has_edge(0, 1));
    }

    #[test]
    fn ties_break_on_lowest_id() {
        let g = graph(4, &[(3, 0)]);
        let r = g.topological_sort();
        assert_eq!(r.sorted, vec![1, 2, 3, 0]);
        assert!(r.cycled.is_empty());
    }

    #[test]
    fn cycles_and_downstream_nodes_are_cycled() {
        let g = graph(5, &[(0, 1), (1, 2), (2, 1), (2, 3), (4, 4)]);
        let r = g.topological_sort();
        assert_eq!(r.sorted, vec![0]);
        assert_eq!(r.cycled, vec![1, 2, 3, 4]);
    }

    #[test]
    fn remove_node_drops_incident_edges() {
        let mut g = graph(3, &[(0, 1), (1, 2)]);
        let targets = g.remove_node(1).unwrap();
        assert!(targets.contains(&2));
        assert_eq!(g.edge_count(), 0);
        assert!(g.predecessors(2).unwrap().is_empty());
        assert!(g.remove_node(1).is_err());
    }

    #[test]
    fn subset_sort_ignores_outside_edges() {
        let g = graph(4, &[(0, 1), (1, 2), (2, 3)]);
        let subset: FxHashSet<u32> = [2, 3].into_iter().collect();
        assert_eq!(g.topological_sort_of(&subset).sorted, vec![2, 3]);
        assert_eq!(g.reachable_from([1]), [1, 2, 3].into_iter().collect());
    }

    fn arb_graph() -> impl Strategy<Value = (u32, Vec<(u32, u32)>)> {
        (1u32..24).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..60)))
    }

    proptest! {
        #[test]
        fn sorted_and_cycled_partition_the_nodes((n, edges) in arb_graph()) {
            let g = graph(n, &edges);
            let r = g.topological_sort();
            prop_assert_eq!(r.sorted.len() + r.cycled.len(), n as usize);
            let pos: FxHashMap<u32, usize> =
                r.sorted.iter().enumerate().map(|(i, v)| (*v, i)).collect();
            for (a, b) in &edges {
                match (pos.get(a), pos.get(b)) {
                    (Some(pa), Some(pb)) => prop_assert!(pa < pb),
                    // nothing sorted can depend on a cycled node
                    (None, Some(_)) => prop_assert!(false, "{} cycled but {} sorted", a, b),
                    _ => {}
                }
            }
        }

        #[test]
        fn acyclic_graphs_have_no_cycled_nodes((n, edges) in arb_graph()) {
            let forward: Vec<(u32, u32)> =
                edges.into_iter().filter(|(a, b)| a < b).collect();
            let g = graph(n, &forward);
            prop_assert!(g.topological_sort().cycled.is_empty());
        }
    }
}
