use std::collections::{BTreeMap, BTreeSet};

use crate::ls_interface::{Density, NodeId};

/// Read-only adjacency snapshot taken once the links are in place
#[derive(Clone, Debug, Default)]
pub struct Topology {
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_adjacency(adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>) -> Self {
        Self { adjacency }
    }

    /// Build from undirected links; endpoints are created on first mention
    pub fn from_links(nodes: impl IntoIterator<Item = NodeId>, links: &[(NodeId, NodeId)]) -> Self {
        let mut adjacency: BTreeMap<NodeId, BTreeSet<NodeId>> =
            nodes.into_iter().map(|n| (n, BTreeSet::new())).collect();
        for &(a, b) in links {
            if a == b {
                continue;
            }
            adjacency.entry(a).or_default().insert(b);
            adjacency.entry(b).or_default().insert(a);
        }
        Self { adjacency }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.adjacency.contains_key(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Direct neighbors plus their neighbors, never the node itself
    ///
    /// Neighbors that are missing from the snapshot still count as 1-hop
    /// members but contribute nothing further.
    pub fn two_hop(&self, node: NodeId) -> BTreeSet<NodeId> {
        let mut reach = BTreeSet::new();
        for first in self.neighbors(node) {
            reach.insert(first);
            for second in self.neighbors(first) {
                if second != node {
                    reach.insert(second);
                }
            }
        }
        reach
    }

    pub fn density(&self, node: NodeId) -> Density {
        self.two_hop(node).len()
    }

    pub fn densities(&self) -> BTreeMap<NodeId, Density> {
        self.nodes().map(|n| (n, self.density(n))).collect()
    }
}
