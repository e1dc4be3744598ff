//! Citation graphs for graph recurrent networks.
//!
//! `citegrn-core` is the structure layer: it loads citation datasets
//! (Cora, Citeseer, Pubmed), holds the undirected citation graph and builds
//! the random-walk propagation operator used to diffuse node features.
//! Tensor work lives in `citegrn-nn`.
//!
//! - [`graph`]: [`CitationGraph`], adjacency and `P = D^-1 A`
//! - [`dataset`]: Planetoid and Pubmed-Diabetes file loaders
//! - [`split`]: train / validation / test node indices
//!
//! # Example
//!
//! ```rust
//! use citegrn_core::CitationGraph;
//!
//! let graph = CitationGraph::from_edges(3, [(0, 1), (1, 2)]).unwrap();
//! let p = graph.propagation_matrix(false);
//!
//! // Node 1 has two neighbours, each gets half the mass.
//! assert_eq!(p[[1, 0]], 0.5);
//! assert_eq!(p[[1, 2]], 0.5);
//! ```

pub mod dataset;
pub mod error;
pub mod graph;
pub mod split;

pub use dataset::{Dataset, DatasetName, LoadOptions};
pub use error::{Error, Result};
pub use graph::CitationGraph;
pub use split::{Split, SplitStrategy};
