use std::collections::BTreeSet;

use hashbrown::HashSet;

use crate::ls_interface::NodeId;

/// Which way the walk climbs the density landscape
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Up,
    Down,
}

/// DFS scratch state riding inside an LS3D header
///
/// `path` is the trail from the origin to the current node; `visited` holds
/// nodes that were popped off the trail while backtracking.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkState {
    path: Vec<NodeId>,
    visited: BTreeSet<NodeId>,
    pub hilltop_once: bool,
    pub direction: Direction,
}

impl WalkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: NodeId) {
        self.path.push(node);
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        self.path.pop()
    }

    pub fn mark_visited(&mut self, node: NodeId) {
        self.visited.insert(node);
    }

    pub fn is_visited(&self, node: NodeId) -> bool {
        self.visited.contains(&node)
    }

    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Everything already walked: the trail plus the backtracked nodes
    pub fn walked(&self) -> HashSet<NodeId> {
        self.path
            .iter()
            .chain(self.visited.iter())
            .copied()
            .collect()
    }

    /// Drop the current node from the trail, mark it visited and return the
    /// node to step back to. `None` once the trail is empty.
    pub fn backtrack(&mut self) -> Option<NodeId> {
        if let Some(current) = self.pop() {
            self.mark_visited(current);
        }
        self.pop()
    }
}
