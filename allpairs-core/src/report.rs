//! Tabular rendering of a finished distance matrix

use std::fmt;

use allpairs_common::{is_unreachable, Weight};

use crate::matrix::DistanceMatrix;

/// Marker printed for cells with no path
pub const UNREACHABLE_MARKER: &str = "N/A";

/// Matrix plus the largest distance a real path can have
pub struct Report<'a> {
    matrix: &'a DistanceMatrix,
    threshold: Weight,
}

impl<'a> Report<'a> {
    /// `threshold` is usually [`Graph::total_weight`](crate::graph::Graph::total_weight)
    pub fn new(matrix: &'a DistanceMatrix, threshold: Weight) -> Self {
        Self { matrix, threshold }
    }

    /// Distance for display, `None` when the cell is unreachable
    pub fn distance(&self, row: usize, column: usize) -> Option<Weight> {
        let weight = self.matrix.get(row, column).ok()?;
        if weight > self.threshold || is_unreachable(weight) {
            None
        } else {
            Some(weight)
        }
    }

    /// Number of ordered pairs `(i, j)`, `i != j`, without a path
    pub fn unreachable_pairs(&self) -> usize {
        let n = self.matrix.dimension();
        (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .filter(|&(i, j)| i != j && self.distance(i, j).is_none())
            .count()
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.matrix.dimension();
        let label_width = n.saturating_sub(1).to_string().len();

        write!(f, "{:>label_width$} |", "")?;
        for column in 0..n {
            write!(f, "\t{column}")?;
        }
        writeln!(f)?;
        writeln!(f)?;

        for row in 0..n {
            write!(f, "{row:>label_width$} |")?;
            for column in 0..n {
                match self.distance(row, column) {
                    Some(weight) => write!(f, "\t{weight}")?,
                    None => write!(f, "\t{UNREACHABLE_MARKER}")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
