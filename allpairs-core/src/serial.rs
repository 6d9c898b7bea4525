//! Single-threaded Floyd-Warshall
//!
//! After phase `k`, `m[i][j]` is optimal over paths whose intermediates lie
//! in `{0..=k}`, so one pass over every k is exact.

use std::ops::Range;
use std::time::Instant;

use allpairs_common::Result;
use log::{debug, info};

use crate::graph::Graph;
use crate::matrix::DistanceMatrix;

/// Relax every `(i, j)` pair, `i != j`, through each `k` in `k_range`
///
/// Returns the number of cells that improved. Out-of-range reads propagate.
pub fn relax_through(matrix: &DistanceMatrix, k_range: Range<usize>) -> Result<usize> {
    let n = matrix.dimension();
    let mut improved = 0usize;

    for k in k_range {
        for j in 0..n {
            let via_kj = matrix.get(k, j)?;
            for i in 0..n {
                if i == j {
                    continue;
                }
                let candidate = matrix.get(i, k)?.saturating_add(via_kj);
                if candidate < matrix.get(i, j)? && matrix.set(i, j, candidate) {
                    improved += 1;
                }
            }
        }
    }

    Ok(improved)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerialEngine;

impl SerialEngine {
    pub fn new() -> Self {
        Self
    }

    /// Relax `matrix` to completion in place
    pub fn run(&self, matrix: &DistanceMatrix) -> Result<()> {
        let start = Instant::now();
        let improved = relax_through(matrix, 0..matrix.dimension())?;
        debug!(
            "serial relaxation: {} vertices, {} improvements in {:.3}s",
            matrix.dimension(),
            improved,
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Seed a matrix from `graph` and relax it
    pub fn solve(&self, graph: &Graph) -> Result<DistanceMatrix> {
        let matrix = graph.seed_matrix()?;
        info!("Running serial Floyd-Warshall on {} vertices", matrix.dimension());
        self.run(&matrix)?;
        Ok(matrix)
    }
}
