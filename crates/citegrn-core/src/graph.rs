//! Undirected citation graph using petgraph.
//!
//! Citation links are directed in the raw data (`cited <- citing`), but
//! feature diffusion treats them as symmetric: an edge in either direction
//! connects both papers, and repeated citations collapse into one edge.

use ndarray::{Array1, Array2, Axis};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::{Error, Result};

/// A citation graph over nodes `0..n`.
///
/// # Example
///
/// ```rust
/// use citegrn_core::CitationGraph;
///
/// let mut graph = CitationGraph::new(3);
/// assert!(graph.add_edge(0, 1).unwrap());
/// assert!(!graph.add_edge(1, 0).unwrap()); // same undirected edge
///
/// assert_eq!(graph.num_edges(), 1);
/// assert_eq!(graph.degree(2), 0);
/// ```
#[derive(Debug, Clone)]
pub struct CitationGraph {
    graph: UnGraph<u32, ()>,
}

impl CitationGraph {
    /// Create a graph with `num_nodes` isolated nodes.
    pub fn new(num_nodes: usize) -> Self {
        let mut graph = UnGraph::with_capacity(num_nodes, num_nodes * 2);
        for i in 0..num_nodes {
            graph.add_node(i as u32);
        }
        Self { graph }
    }

    /// Build a graph from an edge list.
    pub fn from_edges(
        num_nodes: usize,
        edges: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self> {
        let mut graph = Self::new(num_nodes);
        for (a, b) in edges {
            graph.add_edge(a, b)?;
        }
        Ok(graph)
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Add an undirected edge.
    ///
    /// Returns `false` when the edge already exists.
    pub fn add_edge(&mut self, a: usize, b: usize) -> Result<bool> {
        let (ia, ib) = (self.index(a)?, self.index(b)?);
        if self.graph.find_edge(ia, ib).is_some() {
            return Ok(false);
        }
        self.graph.add_edge(ia, ib, ());
        Ok(true)
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        match (self.index(a), self.index(b)) {
            (Ok(ia), Ok(ib)) => self.graph.find_edge(ia, ib).is_some(),
            _ => false,
        }
    }

    /// Distinct neighbours of `node`, sorted.
    pub fn neighbors(&self, node: usize) -> Vec<usize> {
        if node >= self.num_nodes() {
            return Vec::new();
        }
        let mut out: Vec<usize> = self
            .graph
            .neighbors(NodeIndex::new(node))
            .map(|n| n.index())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn degree(&self, node: usize) -> usize {
        self.neighbors(node).len()
    }

    /// Dense symmetric 0/1 adjacency matrix.
    pub fn adjacency(&self, self_loops: bool) -> Array2<f32> {
        let n = self.num_nodes();
        let mut adj = Array2::<f32>::zeros((n, n));
        for edge in self.graph.edge_references() {
            let (s, t) = (edge.source().index(), edge.target().index());
            adj[[s, t]] = 1.0;
            adj[[t, s]] = 1.0;
        }
        if self_loops {
            adj.diag_mut().fill(1.0);
        }
        adj
    }

    /// Random-walk propagation operator `P = D^-1 A`.
    ///
    /// Every row with at least one neighbour sums to one. Rows of isolated
    /// nodes (possible only without self-loops) stay zero.
    pub fn propagation_matrix(&self, self_loops: bool) -> Array2<f32> {
        let mut adj = self.adjacency(self_loops);
        let deg_inv: Array1<f32> = adj
            .sum_axis(Axis(1))
            .mapv(|d| if d > 0.0 { 1.0 / d } else { 0.0 });
        for (mut row, scale) in adj.rows_mut().into_iter().zip(deg_inv.iter()) {
            row *= *scale;
        }
        adj
    }

    fn index(&self, node: usize) -> Result<NodeIndex> {
        if node < self.num_nodes() {
            Ok(NodeIndex::new(node))
        } else {
            Err(Error::NodeOutOfRange {
                node,
                num_nodes: self.num_nodes(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph() -> CitationGraph {
        // 0 - 1 - 2, 3 isolated
        CitationGraph::from_edges(4, [(0, 1), (2, 1)]).unwrap()
    }

    #[test]
    fn test_duplicate_and_reversed_edges_collapse() {
        let mut g = path_graph();
        assert!(!g.add_edge(1, 0).unwrap());
        assert!(!g.add_edge(0, 1).unwrap());
        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.neighbors(1), vec![0, 2]);
    }

    #[test]
    fn test_out_of_range_edge() {
        let mut g = path_graph();
        let err = g.add_edge(0, 4).unwrap_err();
        assert!(matches!(err, Error::NodeOutOfRange { node: 4, num_nodes: 4 }));
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        let adj = path_graph().adjacency(false);
        assert_eq!(adj, adj.t());
        assert_eq!(adj[[0, 1]], 1.0);
        assert_eq!(adj[[0, 0]], 0.0);

        let adj = path_graph().adjacency(true);
        assert_eq!(adj[[3, 3]], 1.0);
    }

    #[test]
    fn test_propagation_rows_sum_to_one() {
        let p = path_graph().propagation_matrix(true);
        for row in p.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        // Node 1 has itself plus two neighbours.
        assert!((p[[1, 0]] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_isolated_row_stays_zero_without_self_loops() {
        let p = path_graph().propagation_matrix(false);
        assert_eq!(p.row(3).sum(), 0.0);
        assert_eq!(p[[0, 1]], 1.0);
    }
}
