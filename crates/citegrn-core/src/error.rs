use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building graphs and loading citation datasets.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error, tagged with the file being read.
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed dataset row.
    #[error("parse error at {}:{line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Edge endpoint outside `0..num_nodes`.
    #[error("node {node} out of range for graph with {num_nodes} nodes")]
    NodeOutOfRange { node: usize, num_nodes: usize },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Train/val/test split that does not fit the graph.
    #[error("invalid split: {0}")]
    InvalidSplit(String),

    /// Dataset name not recognised.
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),
}

impl Error {
    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
