//! Collective operations the distributed engine relies on
//!
//! Every method is a blocking collective: all ranks of the communicator must
//! call it, in the same order, or the peers stall. There is no timeout.

use allpairs_common::{Result, Weight};

/// Rank that seeds the matrix and keeps the final result
pub const ROOT: usize = 0;

pub trait Communicator {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Block until every rank has arrived
    fn barrier(&self) -> Result<()>;

    /// Replace every rank's `buffer` with the root's
    fn broadcast_from_root(&self, buffer: &mut Vec<Weight>) -> Result<()>;

    /// Element-wise minimum across all ranks, delivered to every rank
    fn all_reduce_min(&self, buffer: &mut [Weight]) -> Result<()>;
}

/// Fold `incoming` into `acc`, keeping the smaller value per cell
pub(crate) fn min_into(acc: &mut [Weight], incoming: &[Weight]) {
    use rayon::prelude::*;

    const PAR_MIN_CELLS: usize = 1 << 16;

    if acc.len() >= PAR_MIN_CELLS {
        acc.par_iter_mut()
            .zip(incoming.par_iter())
            .for_each(|(a, &b)| {
                if b < *a {
                    *a = b;
                }
            });
    } else {
        for (a, &b) in acc.iter_mut().zip(incoming) {
            if b < *a {
                *a = b;
            }
        }
    }
}
