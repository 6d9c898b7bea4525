//! Strategy dispatch
//!
//! Distributed runs started from here use in-process ranks; multi-process
//! runs drive [`DistributedEngine`](crate::distributed::DistributedEngine)
//! with a [`TcpCommunicator`](crate::distributed::TcpCommunicator) directly.

use std::time::{Duration, Instant};

use allpairs_common::{Error, Result, Weight};
use log::info;

use crate::config::{SolverConfig, Strategy};
use crate::distributed::run_local;
use crate::graph::Graph;
use crate::matrix::DistanceMatrix;
use crate::parallel::{ParallelEngine, ParallelStats};
use crate::serial::SerialEngine;

/// A finished computation, ready for reporting
#[derive(Debug)]
pub struct Solution {
    pub matrix: DistanceMatrix,
    pub strategy: Strategy,
    /// Threshold above which a cell is reported as unreachable
    pub total_weight: Weight,
    pub elapsed: Duration,
    /// Per-thread diagnostics of the parallel engine
    pub parallel: Option<ParallelStats>,
    /// Rounds run by the distributed engine
    pub rounds: Option<usize>,
}

pub fn solve(graph: &Graph, config: &SolverConfig) -> Result<Solution> {
    config.validate()?;
    if graph.is_empty() {
        return Err(Error::EmptyGraph);
    }

    let start = Instant::now();
    let (matrix, parallel, rounds) = match config.strategy {
        Strategy::Serial => (SerialEngine::new().solve(graph)?, None, None),
        Strategy::Parallel => {
            let (matrix, stats) = ParallelEngine::new(config.threads)?.solve(graph)?;
            (matrix, Some(stats), None)
        }
        Strategy::Distributed => {
            let outcome = run_local(graph, config.ranks, config.rounds)?;
            let matrix = outcome.matrix.ok_or_else(|| {
                Error::Communication("root rank returned no matrix".to_string())
            })?;
            (matrix, None, Some(outcome.rounds))
        }
    };
    let elapsed = start.elapsed();
    info!(
        "{} solve of {} vertices took {:.3}s",
        config.strategy,
        graph.vertex_count(),
        elapsed.as_secs_f64()
    );

    Ok(Solution {
        matrix,
        strategy: config.strategy,
        total_weight: graph.total_weight(),
        elapsed,
        parallel,
        rounds,
    })
}
