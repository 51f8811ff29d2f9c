//! The matrix scalar trait.
//!
//! The distance-matrix substrate and the agglomerative engines are generic
//! over single or double precision. `NjFloat` supplies the two things the
//! generic code cannot get from `num_traits::Float` alone: the finite
//! infinite-distance sentinel used to fill padding cells, and the per-type
//! vectorized block-minimum kernel.

use std::fmt::{Debug, Display};

use num_traits::Float;

use crate::compute::row_min;
use crate::compute::simd::SimdLevel;

/// Scalar type for distance-matrix cells (`f32` or `f64`).
pub trait NjFloat:
    Float + Default + Debug + Display + Send + Sync + 'static
{
    /// Finite stand-in for infinity. Padding cells hold this value at all
    /// times so block scans can never pick them; any active cell reaching it
    /// indicates numerical breakdown.
    const INFINITE_DISTANCE: Self;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;

    /// Minimum of `row[c] - adjust[c]` (or plain `row[c]` when `adjust` is
    /// `None`) over `c < limit`, returning `(value, column)`. Ties resolve to
    /// the smaller column. `column_numbers` is a prefilled `0.0, 1.0, ...`
    /// stream the vector kernels load alongside the row.
    fn vector_row_minimum(
        level: SimdLevel,
        row: &[Self],
        adjust: Option<&[Self]>,
        column_numbers: &[Self],
        limit: usize,
    ) -> (Self, usize);
}

impl NjFloat for f32 {
    const INFINITE_DISTANCE: f32 = 1e36;

    #[inline]
    fn from_f64(v: f64) -> f32 {
        v as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn vector_row_minimum(
        level: SimdLevel,
        row: &[f32],
        adjust: Option<&[f32]>,
        column_numbers: &[f32],
        limit: usize,
    ) -> (f32, usize) {
        row_min::vector_row_minimum_f32(level, row, adjust, column_numbers, limit)
    }
}

impl NjFloat for f64 {
    const INFINITE_DISTANCE: f64 = 1e36;

    #[inline]
    fn from_f64(v: f64) -> f64 {
        v
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    fn vector_row_minimum(
        level: SimdLevel,
        row: &[f64],
        adjust: Option<&[f64]>,
        column_numbers: &[f64],
        limit: usize,
    ) -> (f64, usize) {
        row_min::vector_row_minimum_f64(level, row, adjust, column_numbers, limit)
    }
}
