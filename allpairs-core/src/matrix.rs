//! Dense N×N distance matrix
//!
//! One contiguous row-major buffer of atomic cells. Every accessor takes
//! `&self`, so a matrix can be shared across scoped worker threads without a
//! lock: workers write disjoint row ranges within a phase and the barrier
//! between phases provides the happens-before edge (its mutex), which is why
//! `Relaxed` ordering is enough for the cells themselves.
//!
//! ## Failure policy
//!
//! - `get` out of range: `Err(Error::IndexOutOfBounds)`
//! - `set` out of range: returns `false`, matrix untouched

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use allpairs_common::{Error, Result, Weight, UNREACHABLE};
use log::warn;
use rayon::prelude::*;

/// Buffers smaller than this are merged on the calling thread
const PAR_MERGE_MIN_CELLS: usize = 1 << 16;

pub struct DistanceMatrix {
    dimension: usize,
    cells: Vec<AtomicI64>,
}

impl DistanceMatrix {
    /// Allocate a `dimension`×`dimension` grid with every cell set to `fill`
    pub fn new(dimension: usize, fill: Weight) -> Self {
        let cells = (0..dimension * dimension)
            .map(|_| AtomicI64::new(fill))
            .collect();
        Self { dimension, cells }
    }

    /// Grid with every cell unreachable, ready for seeding
    pub fn unreachable(dimension: usize) -> Self {
        Self::new(dimension, UNREACHABLE)
    }

    /// Rebuild a matrix from a row-major buffer of `dimension²` cells
    pub fn from_flat(dimension: usize, flat: &[Weight]) -> Result<Self> {
        let matrix = Self::unreachable(dimension);
        matrix.overwrite_from_flat(flat)?;
        Ok(matrix)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of cells (`dimension²`)
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    fn index(&self, row: usize, column: usize) -> Option<usize> {
        if row >= self.dimension || column >= self.dimension {
            None
        } else {
            Some(row * self.dimension + column)
        }
    }

    /// Read one cell
    #[inline]
    pub fn get(&self, row: usize, column: usize) -> Result<Weight> {
        match self.index(row, column) {
            Some(idx) => Ok(self.cells[idx].load(Ordering::Relaxed)),
            None => Err(Error::IndexOutOfBounds {
                row,
                column,
                dimension: self.dimension,
            }),
        }
    }

    /// Write one cell; `false` if either index is out of range
    #[inline]
    pub fn set(&self, row: usize, column: usize, value: Weight) -> bool {
        match self.index(row, column) {
            Some(idx) => {
                self.cells[idx].store(value, Ordering::Relaxed);
                true
            }
            None => {
                warn!(
                    "rejected write at ({row}, {column}) on a {0}x{0} matrix",
                    self.dimension
                );
                false
            }
        }
    }

    fn ensure_same_shape(&self, other: &DistanceMatrix) -> Result<()> {
        if self.dimension != other.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }
        Ok(())
    }

    /// Cell-wise `min(self, other)`
    ///
    /// Publishes a phase of the threaded engine into its "previous" view.
    /// There `other <= self` holds for every cell, so this is a copy.
    pub fn merge_minimum(&self, other: &DistanceMatrix) -> Result<()> {
        self.ensure_same_shape(other)?;
        let merge = |(mine, theirs): (&AtomicI64, &AtomicI64)| {
            mine.fetch_min(theirs.load(Ordering::Relaxed), Ordering::Relaxed);
        };
        if self.len() >= PAR_MERGE_MIN_CELLS {
            self.cells.par_iter().zip(other.cells.par_iter()).for_each(merge);
        } else {
            self.cells.iter().zip(other.cells.iter()).for_each(merge);
        }
        Ok(())
    }

    /// Pack into a row-major buffer for collective transport
    pub fn to_flat(&self) -> Vec<Weight> {
        self.cells
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect()
    }

    /// Unpack a row-major buffer produced by [`to_flat`](Self::to_flat)
    pub fn overwrite_from_flat(&self, flat: &[Weight]) -> Result<()> {
        if flat.len() != self.len() {
            return Err(Error::DimensionMismatch {
                expected: self.len(),
                actual: flat.len(),
            });
        }
        for (cell, &value) in self.cells.iter().zip(flat) {
            cell.store(value, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Copy of every row
    pub fn rows(&self) -> Vec<Vec<Weight>> {
        self.to_flat()
            .chunks(self.dimension.max(1))
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}

impl Clone for DistanceMatrix {
    fn clone(&self) -> Self {
        let cells = self
            .cells
            .iter()
            .map(|cell| AtomicI64::new(cell.load(Ordering::Relaxed)))
            .collect();
        Self {
            dimension: self.dimension,
            cells,
        }
    }
}

impl PartialEq for DistanceMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.dimension == other.dimension && self.to_flat() == other.to_flat()
    }
}

impl Eq for DistanceMatrix {}

impl fmt::Debug for DistanceMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistanceMatrix")
            .field("dimension", &self.dimension)
            .field("rows", &self.rows())
            .finish()
    }
}
