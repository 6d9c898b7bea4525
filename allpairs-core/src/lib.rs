//! All-pairs shortest paths over weighted directed graphs
//!
//! Three engines compute the same Floyd-Warshall closure:
//!
//! - [`SerialEngine`]: the reference triple loop
//! - [`ParallelEngine`]: row-partitioned worker threads, two barriers per
//!   intermediate vertex
//! - [`DistributedEngine`]: ranks own slices of intermediate vertices and
//!   merge with an element-wise minimum reduction, generic over a
//!   [`Communicator`] (in-process [`LocalCluster`] or [`TcpCommunicator`])
//!
//! ```
//! use allpairs_core::{Graph, SerialEngine};
//!
//! let graph = Graph::from_lines(["1,4", "2,1", ""]).unwrap();
//! let distances = SerialEngine::new().solve(&graph).unwrap();
//! assert_eq!(distances.get(0, 2).unwrap(), 5);
//! ```

pub mod barrier;
pub mod config;
pub mod distributed;
pub mod generate;
pub mod graph;
pub mod matrix;
pub mod parallel;
pub mod report;
pub mod serial;
pub mod solver;

pub use allpairs_common::{is_unreachable, Error, Result, Weight, UNREACHABLE};
pub use barrier::{Barrier, BarrierWaitResult};
pub use config::{SolverConfig, Strategy, TransportConfig};
pub use distributed::{
    run_local, Communicator, DistributedEngine, LocalCluster, RankOutcome, RoundPolicy,
    TcpCommunicator,
};
pub use generate::{generate_lines, write_graph, GeneratorConfig};
pub use graph::{ingest, Edge, Graph};
pub use matrix::DistanceMatrix;
pub use parallel::{ParallelEngine, ParallelStats, WorkerStats};
pub use report::Report;
pub use serial::SerialEngine;
pub use solver::{solve, Solution};
