//! In-process communicator: ranks are scoped threads sharing one slot
//!
//! Each collective is a three-barrier exchange: enter, deposit/collect,
//! leave. The root clears the slot after the last barrier; the next
//! collective opens with a barrier, so no rank can see a stale slot.

use allpairs_common::{Error, Result, Weight};
use log::debug;
use parking_lot::Mutex;

use super::comm::{min_into, Communicator, ROOT};
use crate::barrier::Barrier;

#[derive(Debug, Default)]
struct Slot {
    buffer: Option<Vec<Weight>>,
    mismatch: bool,
}

#[derive(Debug)]
struct Exchange {
    world_size: usize,
    barrier: Barrier,
    slot: Mutex<Slot>,
}

/// One rank's handle on a [`LocalCluster`]
#[derive(Debug)]
pub struct LocalCommunicator<'a> {
    rank: usize,
    exchange: &'a Exchange,
}

impl LocalCommunicator<'_> {
    fn reset_slot(&self) {
        if self.rank == ROOT {
            *self.exchange.slot.lock() = Slot::default();
        }
    }
}

impl Communicator for LocalCommunicator<'_> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.exchange.world_size
    }

    fn barrier(&self) -> Result<()> {
        self.exchange.barrier.wait()?;
        Ok(())
    }

    fn broadcast_from_root(&self, buffer: &mut Vec<Weight>) -> Result<()> {
        let barrier = &self.exchange.barrier;

        barrier.wait()?;
        if self.rank == ROOT {
            self.exchange.slot.lock().buffer = Some(buffer.clone());
        }
        barrier.wait()?;
        let received = if self.rank == ROOT {
            Ok(())
        } else {
            match self.exchange.slot.lock().buffer.as_ref() {
                Some(root_buffer) => {
                    buffer.clear();
                    buffer.extend_from_slice(root_buffer);
                    Ok(())
                }
                None => Err(Error::Communication(
                    "broadcast slot empty after root deposit".to_string(),
                )),
            }
        };
        barrier.wait()?;
        self.reset_slot();
        received
    }

    fn all_reduce_min(&self, buffer: &mut [Weight]) -> Result<()> {
        let barrier = &self.exchange.barrier;

        barrier.wait()?;
        {
            let mut slot = self.exchange.slot.lock();
            let Slot {
                buffer: acc,
                mismatch,
            } = &mut *slot;
            match acc {
                None => *acc = Some(buffer.to_vec()),
                Some(acc) if acc.len() != buffer.len() => *mismatch = true,
                Some(acc) => min_into(acc, buffer),
            }
        }
        barrier.wait()?;
        let reduced = {
            let slot = self.exchange.slot.lock();
            match slot.buffer.as_ref() {
                Some(acc) if !slot.mismatch && acc.len() == buffer.len() => {
                    buffer.copy_from_slice(acc);
                    Ok(())
                }
                Some(acc) => Err(Error::DimensionMismatch {
                    expected: acc.len(),
                    actual: buffer.len(),
                }),
                None => Err(Error::Communication(
                    "reduction slot empty after deposit".to_string(),
                )),
            }
        };
        barrier.wait()?;
        self.reset_slot();
        reduced
    }
}

/// Runs `world_size` ranks as threads of the current process
pub struct LocalCluster;

impl LocalCluster {
    /// Call `rank_main` once per rank and collect the results in rank order
    pub fn run<T, F>(world_size: usize, rank_main: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(LocalCommunicator<'_>) -> T + Sync,
    {
        let exchange = Exchange {
            world_size,
            barrier: Barrier::new(world_size)?,
            slot: Mutex::new(Slot::default()),
        };
        debug!("starting local cluster with {world_size} ranks");

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..world_size)
                .map(|rank| {
                    let exchange = &exchange;
                    let rank_main = &rank_main;
                    scope.spawn(move || {
                        let _guard = exchange.barrier.guard();
                        rank_main(LocalCommunicator { rank, exchange })
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| handle.join().map_err(|_| Error::WorkerPanicked(rank)))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ranks_is_rejected() {
        let result = LocalCluster::run(0, |comm| comm.rank());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn broadcast_replaces_peer_buffers() {
        let received = LocalCluster::run(4, |comm| {
            let mut buffer = if comm.is_root() {
                vec![1, 2, 3]
            } else {
                vec![9; comm.rank()]
            };
            comm.broadcast_from_root(&mut buffer).unwrap();
            buffer
        })
        .unwrap();
        assert!(received.iter().all(|b| b == &vec![1, 2, 3]));
    }

    #[test]
    fn all_reduce_takes_cellwise_minimum() {
        let reduced = LocalCluster::run(3, |comm| {
            let r = comm.rank() as Weight;
            let mut buffer = vec![10 - r, r, 5];
            comm.all_reduce_min(&mut buffer).unwrap();
            buffer
        })
        .unwrap();
        for buffer in reduced {
            assert_eq!(buffer, vec![8, 0, 5]);
        }
    }

    #[test]
    fn repeated_collectives_do_not_leak_state() {
        let results = LocalCluster::run(3, |comm| {
            let mut totals = Vec::new();
            for round in 0..20 {
                let mut buffer = vec![(comm.rank() + round) as Weight];
                comm.all_reduce_min(&mut buffer).unwrap();
                totals.push(buffer[0]);
                comm.barrier().unwrap();
            }
            totals
        })
        .unwrap();
        let expected: Vec<Weight> = (0..20).collect();
        assert!(results.iter().all(|t| t == &expected));
    }

    #[test]
    fn mismatched_reduction_fails_on_every_rank() {
        let results = LocalCluster::run(2, |comm| {
            let mut buffer = vec![0; 2 + comm.rank()];
            comm.all_reduce_min(&mut buffer)
        })
        .unwrap();
        assert!(results.iter().all(|r| r.is_err()));
    }

    #[test]
    fn panicking_rank_does_not_strand_the_others() {
        let result = LocalCluster::run(3, |comm| {
            if comm.rank() == 1 {
                panic!("rank 1 fails before the first collective");
            }
            comm.barrier()
        });
        assert!(matches!(result, Err(Error::WorkerPanicked(1))));
    }
}
