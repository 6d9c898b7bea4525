//! Error types for the allpairs toolkit
//!
//! Ingestion and seeding errors are fatal to a computation. Out-of-range
//! reads surface as [`Error::IndexOutOfBounds`]; the threaded and distributed
//! engines log and skip those instead of aborting.

use thiserror::Error;

/// Result alias used across the toolkit
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Read outside `[0, dimension)` on either axis
    #[error("index ({row}, {column}) out of bounds for a {dimension}x{dimension} matrix")]
    IndexOutOfBounds {
        row: usize,
        column: usize,
        dimension: usize,
    },

    /// Adjacency line could not be paired into (destination, weight) tokens
    #[error("malformed adjacency line for vertex {vertex}: {reason}")]
    MalformedInput { vertex: usize, reason: String },

    /// Seeding write rejected by the matrix
    #[error("edge {origin} -> {destination} does not fit a graph of {dimension} vertices")]
    EdgeOutOfRange {
        origin: usize,
        destination: usize,
        dimension: usize,
    },

    /// Input contained no vertices
    #[error("input graph is empty")]
    EmptyGraph,

    /// Two matrices or buffers that must agree in size do not
    #[error("dimension mismatch: expected {expected} cells, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid configuration or parameters
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Collective transport failure or protocol violation
    #[error("communication error: {0}")]
    Communication(String),

    /// A rank gave up and told every peer to stop
    #[error("computation aborted by rank {rank}")]
    Aborted { rank: usize },

    /// A worker thread panicked before finishing its phases
    #[error("worker thread {0} panicked")]
    WorkerPanicked(usize),

    /// A party left a barrier round for good (it panicked)
    #[error("barrier broken: a participating thread panicked")]
    BarrierBroken,

    /// File or socket I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn malformed(vertex: usize, reason: impl Into<String>) -> Self {
        Error::MalformedInput {
            vertex,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_vertex() {
        let err = Error::malformed(3, "odd number of tokens");
        assert_eq!(
            err.to_string(),
            "malformed adjacency line for vertex 3: odd number of tokens"
        );
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "graph.txt");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
