//! The square distance-matrix substrate.
//!
//! Rows live in individually owned aligned buffers reached through a handle
//! table, so removing a row is a handle swap rather than a memmove. Columns
//! beyond the active rank always hold the infinite-distance sentinel; the
//! vectorized scans rely on that to read whole blocks without masking.
//!
//! The convention throughout the engines is that column numbers are less than
//! row numbers: only the strictly lower triangle is inspected, and the matrix
//! is kept symmetric around its diagonal so either triangle can be read.

use crate::compute::scalar::NjFloat;
use crate::defaults::MATRIX_ALIGNMENT;
use crate::matrix::aligned::AlignedBuf;

#[derive(Debug)]
pub struct SquareMatrix<T> {
    rank: usize,
    padded_width: usize,
    rows: Vec<AlignedBuf<T>>,
}

impl<T: NjFloat> SquareMatrix<T> {
    pub fn new() -> Self {
        SquareMatrix {
            rank: 0,
            padded_width: 0,
            rows: Vec::new(),
        }
    }

    /// Allocates an `n` x `n` matrix: active cells zero, padding cells set to
    /// the sentinel.
    pub fn set_size(&mut self, n: usize) {
        let block = MATRIX_ALIGNMENT / std::mem::size_of::<T>();
        let padded = if n == 0 {
            0
        } else {
            n.div_ceil(block) * block
        };
        self.rank = n;
        self.padded_width = padded;
        self.rows.clear();
        self.rows.reserve(n);
        for _ in 0..n {
            let mut row = AlignedBuf::new(padded, T::INFINITE_DISTANCE);
            for cell in row.iter_mut().take(n) {
                *cell = T::zero();
            }
            self.rows.push(row);
        }
    }

    /// Number of currently active rows. Shrinks as clusters are joined.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn padded_width(&self) -> usize {
        self.padded_width
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        &self.rows[i]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        &mut self.rows[i]
    }

    /// The full handle table, including any retired buffers past the active
    /// rank. Callers running data-parallel kernels over rows must bound their
    /// iteration by `rank()`.
    #[inline]
    pub fn rows_mut(&mut self) -> &mut [AlignedBuf<T>] {
        &mut self.rows
    }

    #[inline]
    pub fn cell(&self, i: usize, j: usize) -> T {
        self.rows[i][j]
    }

    pub fn set_symmetric(&mut self, i: usize, j: usize, value: T) {
        self.rows[i][j] = value;
        self.rows[j][i] = value;
    }

    /// Copies `rank * rank` doubles from a flat row-major buffer, casting to
    /// the matrix scalar type.
    pub fn load_from_flat(&mut self, flat: &[f64]) {
        let n = self.rank;
        for (i, row) in self.rows.iter_mut().enumerate().take(n) {
            for (j, cell) in row.iter_mut().enumerate().take(n) {
                *cell = T::from_f64(flat[i * n + j]);
            }
        }
    }

    /// `totals[i] = sum of row i over active columns, diagonal excluded`.
    pub fn compute_row_totals(&self, totals: &mut Vec<T>) {
        totals.clear();
        totals.reserve(self.rank);
        for i in 0..self.rank {
            let row = &self.rows[i];
            let mut sum = T::zero();
            for (j, &v) in row.iter().enumerate().take(self.rank) {
                if j != i {
                    sum = sum + v;
                }
            }
            totals.push(sum);
        }
    }

    /// Removes row and column `k` by copying the last active row/column over
    /// it and shrinking the rank. The vacated column is re-filled with the
    /// sentinel so the padding invariant survives.
    ///
    /// Callers maintaining parallel per-row state (totals, row-to-cluster
    /// mappings, sorted candidate lists) must apply the same swap-with-last.
    pub fn remove_row_and_column(&mut self, k: usize) {
        debug_assert!(k < self.rank);
        let last = self.rank - 1;
        if k != last {
            for i in 0..self.rank {
                let moved = self.rows[i][last];
                self.rows[i][k] = moved;
            }
            self.rows.swap(k, last);
        }
        self.rank = last;
        for i in 0..self.rank {
            self.rows[i][last] = T::INFINITE_DISTANCE;
        }
    }

    /// True when every off-diagonal active pair satisfies `M[i][j] == M[j][i]`
    /// and every padding cell still holds the sentinel.
    pub fn check_symmetry_and_padding(&self) -> bool {
        for i in 0..self.rank {
            let row = &self.rows[i];
            for j in 0..i {
                if row[j] != self.rows[j][i] {
                    return false;
                }
            }
            for &cell in row.iter().take(self.padded_width).skip(self.rank) {
                if cell != T::INFINITE_DISTANCE {
                    return false;
                }
            }
        }
        true
    }
}

impl<T: NjFloat> Default for SquareMatrix<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> SquareMatrix<f64> {
        // 4 taxa: AB close, CD close.
        let flat = [
            0.0, 2.0, 4.0, 4.0, //
            2.0, 0.0, 4.0, 4.0, //
            4.0, 4.0, 0.0, 2.0, //
            4.0, 4.0, 2.0, 0.0,
        ];
        let mut m = SquareMatrix::new();
        m.set_size(4);
        m.load_from_flat(&flat);
        m
    }

    #[test]
    fn padding_holds_sentinel_after_load() {
        let m = sample_matrix();
        assert!(m.padded_width() >= 4);
        assert!(m.check_symmetry_and_padding());
    }

    #[test]
    fn row_totals_match_sums() {
        let m = sample_matrix();
        let mut totals = Vec::new();
        m.compute_row_totals(&mut totals);
        assert_eq!(totals, vec![10.0, 10.0, 10.0, 10.0]);
    }

    #[test]
    fn remove_row_swaps_last_into_place() {
        let mut m = sample_matrix();
        m.remove_row_and_column(1);
        assert_eq!(m.rank(), 3);
        // Row 1 now holds what used to be row 3.
        assert_eq!(m.cell(1, 0), 4.0);
        assert_eq!(m.cell(1, 2), 2.0);
        assert!(m.check_symmetry_and_padding());
    }

    #[test]
    fn remove_last_row_is_a_plain_shrink() {
        let mut m = sample_matrix();
        m.remove_row_and_column(3);
        assert_eq!(m.rank(), 3);
        assert_eq!(m.cell(2, 0), 4.0);
        assert!(m.check_symmetry_and_padding());
    }

    #[test]
    fn repeated_removal_reaches_rank_one() {
        let mut m = sample_matrix();
        m.remove_row_and_column(0);
        m.remove_row_and_column(1);
        m.remove_row_and_column(0);
        assert_eq!(m.rank(), 1);
        assert!(m.check_symmetry_and_padding());
    }

    #[test]
    fn single_precision_substrate() {
        let flat = [0.0, 1.0, 1.0, 0.0];
        let mut m: SquareMatrix<f32> = SquareMatrix::new();
        m.set_size(2);
        m.load_from_flat(&flat);
        assert_eq!(m.cell(0, 1), 1.0f32);
        assert_eq!(m.padded_width() % (MATRIX_ALIGNMENT / 4), 0);
    }
}
