//! Common types for the allpairs toolkit

pub mod error;

pub use error::{Error, Result};

/// Path weight stored in a distance matrix.
pub type Weight = i64;

/// Distance stored for "no path".
///
/// Finite so that `UNREACHABLE + UNREACHABLE` never overflows, and larger than
/// any path the ingestion layer can produce (input weights are `u32`).
pub const UNREACHABLE: Weight = Weight::MAX / 2 - 1;

/// Whether `weight` is the unreachable sentinel (or a sum that involves it).
pub fn is_unreachable(weight: Weight) -> bool {
    weight >= UNREACHABLE
}
