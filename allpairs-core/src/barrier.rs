//! Reusable thread rendezvous
//!
//! A generation counter guards against both spurious wakeups and a fast
//! thread lapping the others: a waiter only leaves once the generation it saw
//! on entry has moved on.
//!
//! A party that panics while holding a [`PanicGuard`] breaks the barrier:
//! every current and future `wait` returns [`Error::BarrierBroken`] instead
//! of blocking on a round that can no longer complete.

use allpairs_common::{Error, Result};
use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct BarrierState {
    waiting: usize,
    generation: u64,
    broken: bool,
}

#[derive(Debug)]
pub struct Barrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

/// Returned by [`Barrier::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    leader: bool,
    generation: u64,
}

impl BarrierWaitResult {
    /// True for exactly one thread per round (the last to arrive)
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Round this wait completed
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Barrier {
    pub fn new(parties: usize) -> Result<Self> {
        if parties == 0 {
            return Err(Error::InvalidConfig(
                "barrier needs at least one party".to_string(),
            ));
        }
        Ok(Self {
            parties,
            state: Mutex::new(BarrierState {
                waiting: 0,
                generation: 0,
                broken: false,
            }),
            released: Condvar::new(),
        })
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Block until all parties of the current round have called `wait`
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        let mut state = self.state.lock();
        if state.broken {
            return Err(Error::BarrierBroken);
        }
        let generation = state.generation;
        state.waiting += 1;

        if state.waiting == self.parties {
            state.waiting = 0;
            state.generation = state.generation.wrapping_add(1);
            drop(state);
            self.released.notify_all();
            return Ok(BarrierWaitResult {
                leader: true,
                generation,
            });
        }

        while state.generation == generation {
            if state.broken {
                return Err(Error::BarrierBroken);
            }
            self.released.wait(&mut state);
        }
        Ok(BarrierWaitResult {
            leader: false,
            generation,
        })
    }

    /// Release every waiter with [`Error::BarrierBroken`], now and for good
    pub fn break_barrier(&self) {
        self.state.lock().broken = true;
        self.released.notify_all();
    }

    pub fn is_broken(&self) -> bool {
        self.state.lock().broken
    }

    /// Breaks the barrier if dropped during a panic
    pub fn guard(&self) -> PanicGuard<'_> {
        PanicGuard { barrier: self }
    }
}

/// Returned by [`Barrier::guard`]; hold it for the lifetime of a party
#[derive(Debug)]
pub struct PanicGuard<'a> {
    barrier: &'a Barrier,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.barrier.break_barrier();
        }
    }
}
