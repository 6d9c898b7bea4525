//! Distributed Floyd-Warshall over collective communication
//!
//! Every rank keeps a full copy of the matrix. The k dimension (not the
//! rows) is split into contiguous ranges, one per rank. A round is:
//!
//! 1. relax all `(i, j)`, `i != j`, through the rank's own k-range
//! 2. barrier
//! 3. element-wise minimum reduction of every rank's matrix, delivered back
//!    to all ranks
//!
//! ## Round count
//!
//! A path whose intermediates touch `c` distinct k-ranges is found within
//! `c` rounds: pick any range X on the path; the pieces between consecutive
//! X vertices touch at most `c - 1` ranges, so they are matrix entries after
//! `c - 1` rounds, and X's owner joins them in the next one. Hence
//! [`RoundPolicy::PerRank`] is always exact, and [`RoundPolicy::Classic`]
//! (3 rounds above two ranks) is exact up to three ranks.
//!
//! [`RoundPolicy::UntilStable`] stops once a round improves nothing. At that
//! point every k satisfies the triangle inequality for every pair, which is
//! the Floyd-Warshall closure.

pub mod comm;
pub mod local;
pub mod tcp;

use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::time::{Duration, Instant};

use allpairs_common::{Error, Result, Weight};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::matrix::DistanceMatrix;

pub use comm::{Communicator, ROOT};
pub use local::{LocalCluster, LocalCommunicator};
pub use tcp::TcpCommunicator;

/// How many relax/reduce rounds the distributed engine runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPolicy {
    /// 3 rounds above two ranks, otherwise one round per rank
    #[default]
    Classic,
    /// One round per rank
    #[serde(alias = "per-rank")]
    PerRank,
    /// Exactly this many rounds
    Fixed(usize),
    /// Stop after the first round without improvements
    UntilStable { max_rounds: usize },
}

impl RoundPolicy {
    /// Upper bound on rounds for `world_size` ranks
    pub fn max_rounds(&self, world_size: usize) -> usize {
        match *self {
            RoundPolicy::Classic if world_size > 2 => 3,
            RoundPolicy::Classic | RoundPolicy::PerRank => world_size,
            RoundPolicy::Fixed(rounds) => rounds,
            RoundPolicy::UntilStable { max_rounds } => max_rounds,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            RoundPolicy::Fixed(0) | RoundPolicy::UntilStable { max_rounds: 0 } => Err(
                Error::InvalidConfig("round policy must allow at least one round".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for RoundPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPolicy::Classic => write!(f, "classic"),
            RoundPolicy::PerRank => write!(f, "per-rank"),
            RoundPolicy::Fixed(rounds) => write!(f, "{rounds}"),
            RoundPolicy::UntilStable { max_rounds } => write!(f, "stable:{max_rounds}"),
        }
    }
}

impl FromStr for RoundPolicy {
    type Err = Error;

    /// `classic`, `per-rank` (or `per_rank`), `stable`, `stable:<max>` or a
    /// round count
    fn from_str(s: &str) -> Result<Self> {
        let policy = match s.trim() {
            "classic" => RoundPolicy::Classic,
            "per-rank" | "per_rank" => RoundPolicy::PerRank,
            "stable" => RoundPolicy::UntilStable { max_rounds: 64 },
            other => {
                if let Some(max) = other.strip_prefix("stable:") {
                    let max_rounds = max.parse().map_err(|_| {
                        Error::InvalidConfig(format!("bad round limit '{max}'"))
                    })?;
                    RoundPolicy::UntilStable { max_rounds }
                } else {
                    let rounds = other.parse().map_err(|_| {
                        Error::InvalidConfig(format!(
                            "unknown round policy '{other}' (classic, per-rank, stable[:N] or a number)"
                        ))
                    })?;
                    RoundPolicy::Fixed(rounds)
                }
            }
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Contiguous k-range owned by `rank`; the last rank absorbs the remainder
pub fn k_partition(rank: usize, world_size: usize, n: usize) -> Range<usize> {
    if world_size == 0 || rank >= world_size {
        return 0..0;
    }
    let step = n / world_size;
    let start = rank * step;
    let end = if rank == world_size - 1 { n } else { start + step };
    start..end
}

/// Per-rank lifecycle, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankState {
    Uninitialized,
    Seeded,
    Relaxing { round: usize },
    Barrier { round: usize },
    Reducing { round: usize },
    Broadcasting { round: usize },
    Finalized,
}

/// What one rank ends up with after [`DistributedEngine::run`]
#[derive(Debug)]
pub struct RankOutcome {
    pub rank: usize,
    /// Final matrix, only on the root
    pub matrix: Option<DistanceMatrix>,
    pub rounds: usize,
    pub k_range: Range<usize>,
    /// Relaxations skipped on out-of-range reads
    pub skipped_reads: u64,
    pub elapsed: Duration,
}

pub struct DistributedEngine<C: Communicator> {
    comm: C,
    rounds: RoundPolicy,
}

impl<C: Communicator> DistributedEngine<C> {
    pub fn new(comm: C, rounds: RoundPolicy) -> Result<Self> {
        rounds.validate()?;
        Ok(Self { comm, rounds })
    }

    fn transition(&self, state: &mut RankState, next: RankState) {
        debug!("rank {}: {:?} -> {:?}", self.comm.rank(), state, next);
        *state = next;
    }

    /// Run the full protocol; every rank must call this with the same graph
    ///
    /// Only the root seeds from `graph`; the others use its vertex count.
    pub fn run(&self, graph: &Graph) -> Result<RankOutcome> {
        let start = Instant::now();
        let rank = self.comm.rank();
        let world_size = self.comm.world_size();
        let n = graph.vertex_count();
        let mut state = RankState::Uninitialized;

        if n == 0 {
            return Err(Error::EmptyGraph);
        }

        let matrix = DistanceMatrix::unreachable(n);
        let mut buffer = Vec::new();
        if self.comm.is_root() {
            if let Err(e) = graph.seed_into(&matrix) {
                error!("rank {rank}: seeding failed, aborting all ranks: {e}");
                // An empty broadcast tells the peers to stop
                self.comm.broadcast_from_root(&mut buffer)?;
                return Err(e);
            }
            buffer = matrix.to_flat();
        }
        self.comm.broadcast_from_root(&mut buffer)?;
        if buffer.is_empty() {
            return Err(Error::Aborted { rank: ROOT });
        }
        matrix.overwrite_from_flat(&buffer)?;
        self.transition(&mut state, RankState::Seeded);

        let k_range = k_partition(rank, world_size, n);
        let max_rounds = self.rounds.max_rounds(world_size);
        if self.rounds == RoundPolicy::Classic && world_size > 3 && self.comm.is_root() {
            warn!(
                "classic policy runs 3 rounds on {world_size} ranks and may miss shortest paths; \
                 use per-rank or stable for exact results"
            );
        }
        debug!("rank {rank}: owns k in {k_range:?}, up to {max_rounds} rounds");

        let mut skipped_reads = 0u64;
        let mut rounds = 0usize;
        for round in 1..=max_rounds {
            self.transition(&mut state, RankState::Relaxing { round });
            let (improved, skipped) = relax_k_range(&matrix, k_range.clone());
            skipped_reads += skipped;

            self.transition(&mut state, RankState::Barrier { round });
            self.comm.barrier()?;

            self.transition(&mut state, RankState::Reducing { round });
            let mut flat = matrix.to_flat();
            self.comm.all_reduce_min(&mut flat)?;

            self.transition(&mut state, RankState::Broadcasting { round });
            matrix.overwrite_from_flat(&flat)?;
            rounds = round;

            if let RoundPolicy::UntilStable { .. } = self.rounds {
                // min over ranks: 0 as soon as anyone improved a cell
                let mut quiet = [Weight::from(improved == 0)];
                self.comm.all_reduce_min(&mut quiet)?;
                if quiet[0] == 1 {
                    debug!("rank {rank}: stable after round {round}");
                    break;
                }
                if round == max_rounds {
                    warn!("rank {rank}: still improving after {max_rounds} rounds");
                }
            }
        }

        self.comm.barrier()?;
        self.transition(&mut state, RankState::Finalized);

        if skipped_reads > 0 {
            warn!("rank {rank}: {skipped_reads} relaxations skipped on out-of-range reads");
        }
        if self.comm.is_root() {
            info!(
                "Distributed run finished: {world_size} ranks, {rounds} rounds, {:.3}s",
                start.elapsed().as_secs_f64()
            );
        }

        Ok(RankOutcome {
            rank,
            matrix: self.comm.is_root().then_some(matrix),
            rounds,
            k_range,
            skipped_reads,
            elapsed: start.elapsed(),
        })
    }
}

/// Relax every `(i, j)`, `i != j`, through `k_range`
///
/// Out-of-range reads are logged and skipped rather than aborting the rank.
/// Returns `(improved cells, skipped relaxations)`.
fn relax_k_range(matrix: &DistanceMatrix, k_range: Range<usize>) -> (usize, u64) {
    let n = matrix.dimension();
    let mut improved = 0usize;
    let mut skipped = 0u64;

    for k in k_range {
        for j in 0..n {
            for i in 0..n {
                if i == j {
                    continue;
                }
                match try_relax(matrix, i, j, k) {
                    Ok(true) => improved += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!("skipping ({i}, {j}) via {k}: {e}");
                        skipped += 1;
                    }
                }
            }
        }
    }

    (improved, skipped)
}

#[inline]
fn try_relax(matrix: &DistanceMatrix, i: usize, j: usize, k: usize) -> Result<bool> {
    let candidate = matrix.get(i, k)?.saturating_add(matrix.get(k, j)?);
    Ok(candidate < matrix.get(i, j)? && matrix.set(i, j, candidate))
}

/// Run the protocol on `world_size` in-process ranks and return the root's
/// outcome
pub fn run_local(graph: &Graph, world_size: usize, rounds: RoundPolicy) -> Result<RankOutcome> {
    let outcomes = LocalCluster::run(world_size, |comm| {
        DistributedEngine::new(comm, rounds)?.run(graph)
    })?;
    outcomes
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidConfig("local cluster ran no ranks".to_string()))?
}
