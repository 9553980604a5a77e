//! Multi-level region graph.
//!
//! Nodes are partitioned into ordered levels (one per analysis scale,
//! one node per region); edges only connect adjacent levels, directed
//! from the coarser node (level l+1) to the finer node (level l), and
//! carry the number of samples the two regions share. The mutation
//! surface is append-node / append-edge / swap-same-level-nodes: nothing
//! is ever removed, persistence tracking only relabels and reorders.

use hashbrown::HashMap;

/// A node: one region at one level, holding its incident edge ids.
///
/// `incoming` edges arrive from level `l + 1`, `outgoing` edges leave
/// toward level `l - 1`; both lists index the corresponding mid-level
/// edge array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelNode {
    /// Edge ids in the mid-level above (this node is the target).
    pub incoming: Vec<u32>,
    /// Edge ids in the mid-level below (this node is the source).
    pub outgoing: Vec<u32>,
}

/// An edge between adjacent levels with its shared-sample weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelEdge {
    /// Node index at the coarser level (l + 1).
    pub source: u32,
    /// Node index at the finer level (l).
    pub target: u32,
    /// Number of samples the two regions share.
    pub weight: f64,
}

/// A graph whose nodes are partitioned into ordered levels, with edges
/// only between adjacent levels and named per-node attribute columns.
///
/// # Example
///
/// ```
/// use cloud_scale::LevelGraph;
///
/// let mut graph = LevelGraph::new();
/// graph.add_level();
/// graph.add_level();
/// let fine = graph.add_node(0);
/// let coarse = graph.add_node(1);
/// graph.add_edge(0, coarse, fine, 12.0);
///
/// assert_eq!(graph.edge_count(0), 1);
/// assert_eq!(graph.edge(0, 0).weight, 12.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelGraph {
    levels: Vec<Vec<LevelNode>>,
    edges: Vec<Vec<LevelEdge>>,
    node_attributes: HashMap<String, Vec<Vec<f64>>>,
}

impl LevelGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an empty level, returning its index.
    pub fn add_level(&mut self) -> usize {
        self.levels.push(Vec::new());
        if self.levels.len() > 1 {
            self.edges.push(Vec::new());
        }
        for columns in self.node_attributes.values_mut() {
            columns.push(Vec::new());
        }
        self.levels.len() - 1
    }

    /// Number of levels.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of nodes at `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level` is out of range.
    #[must_use]
    pub fn node_count(&self, level: usize) -> usize {
        self.levels[level].len()
    }

    /// Number of edges between `mid_level` and `mid_level + 1`.
    ///
    /// # Panics
    ///
    /// Panics if `mid_level` is out of range.
    #[must_use]
    pub fn edge_count(&self, mid_level: usize) -> usize {
        self.edges[mid_level].len()
    }

    /// Appends a node to `level`, returning its index within the level.
    /// Every named attribute column gains a zero entry for it.
    ///
    /// # Panics
    ///
    /// Panics if `level` is out of range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_node(&mut self, level: usize) -> u32 {
        self.levels[level].push(LevelNode::default());
        for columns in self.node_attributes.values_mut() {
            columns[level].push(0.0);
        }
        (self.levels[level].len() - 1) as u32
    }

    /// Appends an edge between `source` at level `mid_level + 1` and
    /// `target` at level `mid_level`, wiring both nodes' edge lists.
    /// Returns the edge id within the mid-level.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is out of range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_edge(&mut self, mid_level: usize, source: u32, target: u32, weight: f64) -> u32 {
        assert!((source as usize) < self.levels[mid_level + 1].len());
        assert!((target as usize) < self.levels[mid_level].len());
        let id = self.edges[mid_level].len() as u32;
        self.edges[mid_level].push(LevelEdge {
            source,
            target,
            weight,
        });
        self.levels[mid_level + 1][source as usize].outgoing.push(id);
        self.levels[mid_level][target as usize].incoming.push(id);
        id
    }

    /// The node at `(level, index)`.
    ///
    /// # Panics
    ///
    /// Panics if the reference is out of range.
    #[must_use]
    pub fn node(&self, level: usize, index: u32) -> &LevelNode {
        &self.levels[level][index as usize]
    }

    /// The edge `id` of `mid_level`.
    ///
    /// # Panics
    ///
    /// Panics if the reference is out of range.
    #[must_use]
    pub fn edge(&self, mid_level: usize, id: u32) -> &LevelEdge {
        &self.edges[mid_level][id as usize]
    }

    /// Adds `delta` to an edge's weight.
    ///
    /// # Panics
    ///
    /// Panics if the reference is out of range.
    pub fn add_edge_weight(&mut self, mid_level: usize, id: u32, delta: f64) {
        self.edges[mid_level][id as usize].weight += delta;
    }

    /// Finds the edge from `source` (level `mid_level + 1`) to `target`
    /// (level `mid_level`), if present.
    #[must_use]
    pub fn find_edge(&self, mid_level: usize, source: u32, target: u32) -> Option<u32> {
        self.levels[mid_level + 1][source as usize]
            .outgoing
            .iter()
            .copied()
            .find(|&id| self.edges[mid_level][id as usize].target == target)
    }

    /// Swaps two nodes of the same level, rewriting the endpoints of
    /// their incident edges and their attribute entries. Edge weights
    /// and all other nodes are untouched.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn swap_nodes(&mut self, level: usize, a: u32, b: u32) {
        if a == b {
            return;
        }
        self.levels[level].swap(a as usize, b as usize);
        for columns in self.node_attributes.values_mut() {
            columns[level].swap(a as usize, b as usize);
        }
        // Each incident edge names exactly one node per level, so fixing
        // the two swapped positions cannot touch an edge twice per field.
        for position in [a, b] {
            let node = &self.levels[level][position as usize];
            let outgoing = node.outgoing.clone();
            let incoming = node.incoming.clone();
            for id in outgoing {
                self.edges[level - 1][id as usize].source = position;
            }
            for id in incoming {
                self.edges[level][id as usize].target = position;
            }
        }
        debug_assert!(self.is_consistent());
    }

    /// Installs a named per-node attribute column for `level`.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not cover the level's nodes.
    pub fn set_node_attribute(&mut self, name: &str, level: usize, values: Vec<f64>) {
        assert_eq!(values.len(), self.levels[level].len());
        let columns = self
            .node_attributes
            .entry(name.to_owned())
            .or_insert_with(|| vec![Vec::new(); self.levels.len()]);
        columns[level] = values;
    }

    /// The named attribute column of `level`, if installed.
    #[must_use]
    pub fn node_attribute(&self, name: &str, level: usize) -> Option<&[f64]> {
        self.node_attributes
            .get(name)
            .and_then(|columns| columns.get(level))
            .map(Vec::as_slice)
    }

    /// Names of installed node attributes, sorted.
    #[must_use]
    pub fn node_attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.node_attributes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Verifies that edge endpoints and node edge lists agree and that
    /// edges only connect adjacent levels. Cheap enough for debug
    /// assertions and tests.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn is_consistent(&self) -> bool {
        if !self.edges.len().checked_add(1).is_some_and(|n| {
            n == self.levels.len() || (self.levels.is_empty() && self.edges.is_empty())
        }) {
            return false;
        }
        for (mid, edges) in self.edges.iter().enumerate() {
            for (id, edge) in edges.iter().enumerate() {
                let id = id as u32;
                let Some(source) = self.levels[mid + 1].get(edge.source as usize) else {
                    return false;
                };
                let Some(target) = self.levels[mid].get(edge.target as usize) else {
                    return false;
                };
                if !source.outgoing.contains(&id) || !target.incoming.contains(&id) {
                    return false;
                }
            }
        }
        for (level, nodes) in self.levels.iter().enumerate() {
            for (index, node) in nodes.iter().enumerate() {
                let index = index as u32;
                for &id in &node.outgoing {
                    if level == 0 || self.edges[level - 1][id as usize].source != index {
                        return false;
                    }
                }
                for &id in &node.incoming {
                    if level + 1 == self.levels.len()
                        || self.edges[level][id as usize].target != index
                    {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_level_graph() -> LevelGraph {
        let mut graph = LevelGraph::new();
        graph.add_level();
        graph.add_level();
        for _ in 0..3 {
            graph.add_node(0);
        }
        for _ in 0..2 {
            graph.add_node(1);
        }
        graph.add_edge(0, 0, 0, 5.0);
        graph.add_edge(0, 0, 1, 2.0);
        graph.add_edge(0, 1, 2, 7.0);
        graph
    }

    #[test]
    fn add_edge_wires_both_nodes() {
        let graph = two_level_graph();
        assert!(graph.is_consistent());
        assert_eq!(graph.node(1, 0).outgoing, vec![0, 1]);
        assert_eq!(graph.node(0, 2).incoming, vec![2]);
    }

    #[test]
    fn find_edge_scans_outgoing() {
        let graph = two_level_graph();
        assert_eq!(graph.find_edge(0, 0, 1), Some(1));
        assert_eq!(graph.find_edge(0, 1, 0), None);
    }

    #[test]
    fn add_edge_weight_accumulates() {
        let mut graph = two_level_graph();
        graph.add_edge_weight(0, 0, 3.0);
        approx::assert_relative_eq!(graph.edge(0, 0).weight, 8.0);
    }

    #[test]
    fn swap_nodes_preserves_adjacency() {
        let mut graph = two_level_graph();
        graph.set_node_attribute("population", 0, vec![10.0, 20.0, 30.0]);
        graph.swap_nodes(0, 0, 2);

        assert!(graph.is_consistent());
        // The edge that pointed at old node 0 now points at position 2.
        assert_eq!(graph.edge(0, 0).target, 2);
        assert_eq!(graph.edge(0, 2).target, 0);
        assert_eq!(
            graph.node_attribute("population", 0),
            Some(&[30.0, 20.0, 10.0][..])
        );
    }

    #[test]
    fn swap_same_node_is_noop() {
        let mut graph = two_level_graph();
        let before = graph.clone();
        graph.swap_nodes(1, 1, 1);
        assert_eq!(graph, before);
    }

    #[test]
    fn swap_coarse_nodes_rewrites_sources() {
        let mut graph = two_level_graph();
        graph.swap_nodes(1, 0, 1);
        assert!(graph.is_consistent());
        assert_eq!(graph.edge(0, 0).source, 1);
        assert_eq!(graph.edge(0, 2).source, 0);
    }

    #[test]
    fn attributes_follow_added_nodes() {
        let mut graph = LevelGraph::new();
        graph.add_level();
        graph.add_node(0);
        graph.set_node_attribute("scale", 0, vec![0.5]);
        graph.add_node(0);
        assert_eq!(graph.node_attribute("scale", 0), Some(&[0.5, 0.0][..]));
    }

    #[test]
    fn empty_graph_is_consistent() {
        assert!(LevelGraph::new().is_consistent());
    }
}
