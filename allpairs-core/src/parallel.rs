//! Barrier-synchronized threaded Floyd-Warshall
//!
//! Rows are split statically across a fixed pool of scoped OS threads. Each
//! phase k runs in three steps:
//!
//! 1. every worker relaxes `current[i][j]` for its own rows `i`, reading the
//!    phase sources from `previous` only
//! 2. `barrier.wait()`, then the publisher (last thread) folds `current`
//!    into `previous` while the others wait
//! 3. `barrier.wait()` again, so nobody reads `previous` for phase k+1
//!    before the publish step of phase k is done
//!
//! Within a phase the writers own disjoint rows of `current` and `previous`
//! is read-only, so the matrices need no locks.
//!
//! Every worker holds a [`PanicGuard`](crate::barrier::PanicGuard): a worker
//! that panics breaks the barrier, the others return, and the run fails with
//! [`Error::WorkerPanicked`].

use std::ops::Range;
use std::time::{Duration, Instant};

use allpairs_common::{Error, Result};
use log::{debug, info, warn};

use crate::barrier::Barrier;
use crate::graph::Graph;
use crate::matrix::DistanceMatrix;

/// Split `n` rows over `threads` workers; the last one takes the remainder
pub fn row_partition(n: usize, threads: usize) -> Vec<Range<usize>> {
    if threads == 0 {
        return Vec::new();
    }
    let rows_per_thread = n / threads;
    let remainder = n % threads;
    (0..threads)
        .map(|t| {
            let start = t * rows_per_thread;
            let mut end = start + rows_per_thread;
            if t == threads - 1 {
                end += remainder;
            }
            start..end
        })
        .collect()
}

/// Per-thread diagnostics
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub thread_id: usize,
    pub rows: Range<usize>,
    pub elapsed: Duration,
    /// Relaxations skipped because of an out-of-range read
    pub skipped_reads: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ParallelStats {
    pub workers: Vec<WorkerStats>,
    pub elapsed: Duration,
}

impl ParallelStats {
    pub fn skipped_reads(&self) -> u64 {
        self.workers.iter().map(|w| w.skipped_reads).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ParallelEngine {
    threads: usize,
}

impl ParallelEngine {
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::InvalidConfig(
                "parallel engine needs at least one thread".to_string(),
            ));
        }
        Ok(Self { threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Seed `current` and `previous` from `graph` and relax to completion
    pub fn solve(&self, graph: &Graph) -> Result<(DistanceMatrix, ParallelStats)> {
        let current = graph.seed_matrix()?;
        let previous = current.clone();
        info!(
            "Running parallel Floyd-Warshall on {} vertices with {} threads",
            current.dimension(),
            self.threads
        );
        let stats = self.run(&current, &previous)?;
        Ok((current, stats))
    }

    /// Relax `current` in place; `previous` must start as an identical copy
    pub fn run(
        &self,
        current: &DistanceMatrix,
        previous: &DistanceMatrix,
    ) -> Result<ParallelStats> {
        if current.dimension() != previous.dimension() {
            return Err(Error::DimensionMismatch {
                expected: current.len(),
                actual: previous.len(),
            });
        }

        let start = Instant::now();
        let barrier = Barrier::new(self.threads)?;
        let partition = row_partition(current.dimension(), self.threads);
        let publisher = self.threads - 1;

        let results: Vec<Result<WorkerStats>> = std::thread::scope(|scope| {
            let handles: Vec<_> = partition
                .into_iter()
                .enumerate()
                .map(|(thread_id, rows)| {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        worker(thread_id, rows, thread_id == publisher, current, previous, barrier)
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(thread_id, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(Error::WorkerPanicked(thread_id)))
                })
                .collect()
        });

        // A panic breaks the barrier for everyone; report the cause, not the fallout
        if let Some(thread_id) = results
            .iter()
            .position(|r| matches!(r, Err(Error::WorkerPanicked(_))))
        {
            return Err(Error::WorkerPanicked(thread_id));
        }
        let workers = results.into_iter().collect::<Result<Vec<_>>>()?;
        let stats = ParallelStats {
            workers,
            elapsed: start.elapsed(),
        };
        if stats.skipped_reads() > 0 {
            warn!("{} relaxations skipped on out-of-range reads", stats.skipped_reads());
        }
        Ok(stats)
    }
}

fn worker(
    thread_id: usize,
    rows: Range<usize>,
    is_publisher: bool,
    current: &DistanceMatrix,
    previous: &DistanceMatrix,
    barrier: &Barrier,
) -> Result<WorkerStats> {
    let start = Instant::now();
    let n = current.dimension();
    let mut skipped_reads = 0u64;
    let mut publish_error = None;

    let _guard = barrier.guard();
    debug!("worker {thread_id}: rows {rows:?}");

    for k in 0..n {
        for j in 0..n {
            for i in rows.clone() {
                match relax_cell(current, previous, i, j, k) {
                    Ok(()) => {}
                    Err(e) => {
                        warn!("worker {thread_id}: skipping ({i}, {j}) via {k}: {e}");
                        skipped_reads += 1;
                    }
                }
            }
        }

        barrier.wait()?;
        // Keep taking part in every barrier even after a failed publish so the
        // other workers are not left waiting
        if is_publisher && publish_error.is_none() {
            if let Err(e) = previous.merge_minimum(current) {
                publish_error = Some(e);
            }
        }
        barrier.wait()?;
    }

    if let Some(e) = publish_error {
        return Err(e);
    }

    Ok(WorkerStats {
        thread_id,
        rows,
        elapsed: start.elapsed(),
        skipped_reads,
    })
}

#[inline]
fn relax_cell(
    current: &DistanceMatrix,
    previous: &DistanceMatrix,
    i: usize,
    j: usize,
    k: usize,
) -> Result<()> {
    let candidate = previous.get(i, k)?.saturating_add(previous.get(k, j)?);
    if candidate < current.get(i, j)? {
        current.set(i, j, candidate);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::SerialEngine;
    use allpairs_common::Weight;

    #[test]
    fn partition_appends_remainder_to_last_thread() {
        assert_eq!(row_partition(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(row_partition(4, 4), vec![0..1, 1..2, 2..3, 3..4]);
        assert_eq!(row_partition(2, 3), vec![0..0, 0..0, 0..2]);
        assert!(row_partition(5, 0).is_empty());
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(ParallelEngine::new(0).is_err());
    }

    #[test]
    fn matches_serial_for_uneven_split() {
        let graph = Graph::from_lines([
            "1,4,4,1",
            "2,1",
            "0,2,3,5",
            "1,1",
            "3,2,2,9",
        ])
        .unwrap();
        let expected = SerialEngine::new().solve(&graph).unwrap();

        for threads in 1..=7 {
            let (m, stats) = ParallelEngine::new(threads).unwrap().solve(&graph).unwrap();
            assert_eq!(m, expected, "{threads} threads");
            assert_eq!(stats.workers.len(), threads);
            assert_eq!(stats.skipped_reads(), 0);
            let covered: usize = stats.workers.iter().map(|w| w.rows.len()).sum();
            assert_eq!(covered, 5);
        }
    }

    #[test]
    fn mismatched_matrices_are_rejected() {
        let engine = ParallelEngine::new(2).unwrap();
        let a = DistanceMatrix::unreachable(3);
        let b = DistanceMatrix::unreachable(4);
        assert!(matches!(
            engine.run(&a, &b),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn seeding_failure_aborts_before_threads_start() {
        let graph = Graph::from_lines(["7,1", ""]).unwrap();
        let engine = ParallelEngine::new(2).unwrap();
        assert!(matches!(
            engine.solve(&graph),
            Err(Error::EdgeOutOfRange { .. })
        ));
    }

    #[test]
    fn extreme_fill_values_saturate_instead_of_overflowing() {
        let current = DistanceMatrix::new(3, Weight::MAX);
        let previous = current.clone();
        let stats = ParallelEngine::new(2)
            .unwrap()
            .run(&current, &previous)
            .unwrap();
        assert_eq!(stats.workers.len(), 2);
        assert!(current.to_flat().iter().all(|&w| w == Weight::MAX));
    }
}
