//! Join criteria for the agglomerative engine.
//!
//! The engine drives one join loop; a criterion supplies the pieces that
//! differ between UPGMA, NJ, BIONJ and UNJ: the scan adjustment (via
//! `uses_row_totals`), branch lengths for a join, the row-merge coefficients,
//! and the terminal 3-way branch lengths. BIONJ additionally carries a
//! variance matrix, merged and compacted in lock-step with the distance
//! matrix through the `after_merge` / `compact` hooks.
//!
//! Merged rows all have the form `lambda * M[low][k] + mu * M[high][k] +
//! delta`, which is what lets one parallel merge kernel serve every
//! criterion.

use crate::compute::scalar::NjFloat;
use crate::matrix::SquareMatrix;

/// The algorithm-specific capabilities of one agglomerative criterion.
pub trait JoinCriterion<T: NjFloat>: Send {
    /// Whether candidate scores subtract scaled row totals during the scan
    /// (the NJ criterion `D(i,j) - (T(i)+T(j))/(N'-2)`).
    fn uses_row_totals(&self) -> bool;

    /// Called once after the matrix loads, before the first join.
    fn prepare(&mut self, _matrix: &SquareMatrix<T>) {}

    /// Branch lengths from the joined clusters (low, high) to the new
    /// cluster, given raw distance `d` and the row totals at join time.
    fn branch_lengths(
        &self,
        d: T,
        total_low: T,
        total_high: T,
        size_low: usize,
        size_high: usize,
        rank: usize,
    ) -> (T, T);

    /// Coefficients `(lambda, mu, delta)` of the merged row:
    /// `merged[k] = lambda * M[low][k] + mu * M[high][k] + delta`.
    fn merge_coefficients(
        &mut self,
        low: usize,
        high: usize,
        d: T,
        size_low: usize,
        size_high: usize,
        rank: usize,
    ) -> (T, T, T);

    /// Companion-state merge hook, called after the distance matrix has
    /// taken the merged row but before compaction.
    fn after_merge(&mut self, _low: usize, _high: usize) {}

    /// Companion-state compaction hook, mirroring `remove_row_and_column`.
    fn compact(&mut self, _k: usize) {}

    /// Branch lengths of the terminal 3-way link, from the final 3x3
    /// submatrix and the three remaining clusters' sizes.
    fn finish_three_lengths(&self, d01: T, d02: T, d12: T, sizes: [usize; 3]) -> (T, T, T);
}

fn half<T: NjFloat>() -> T {
    T::from_f64(0.5)
}

// ============================================================================
// UPGMA
// ============================================================================

/// UPGMA (Sokal, Michener 1958): joins the globally closest pair; merged
/// rows are the leaf-count-weighted mean of the parent rows.
#[derive(Debug, Default)]
pub struct UpgmaCriterion;

impl UpgmaCriterion {
    pub fn new() -> Self {
        UpgmaCriterion
    }
}

impl<T: NjFloat> JoinCriterion<T> for UpgmaCriterion {
    fn uses_row_totals(&self) -> bool {
        false
    }

    fn branch_lengths(
        &self,
        d: T,
        _total_low: T,
        _total_high: T,
        _size_low: usize,
        _size_high: usize,
        _rank: usize,
    ) -> (T, T) {
        let l = d * half();
        (l, l)
    }

    fn merge_coefficients(
        &mut self,
        _low: usize,
        _high: usize,
        _d: T,
        size_low: usize,
        size_high: usize,
        _rank: usize,
    ) -> (T, T, T) {
        let lambda = T::from_f64(size_low as f64 / (size_low + size_high) as f64);
        (lambda, T::one() - lambda, T::zero())
    }

    /// Size-weighted terminal link: `w[i] = size[i] / (2 * sum(sizes))`, each
    /// branch a weighted mix of the two distances incident on its cluster.
    fn finish_three_lengths(&self, d01: T, d02: T, d12: T, sizes: [usize; 3]) -> (T, T, T) {
        let denominator: usize = sizes.iter().sum();
        let w = |i: usize| T::from_f64(sizes[i] as f64 / (2.0 * denominator as f64));
        (
            w(1) * d01 + w(2) * d02,
            w(0) * d01 + w(2) * d12,
            w(0) * d02 + w(1) * d12,
        )
    }
}

// ============================================================================
// NJ
// ============================================================================

/// Neighbor Joining (Saitou, Nei 1987). Scores are adjusted by scaled row
/// totals; merged rows are the plain mean of the parent rows minus half the
/// joined distance.
#[derive(Debug, Default)]
pub struct NjCriterion;

impl NjCriterion {
    pub fn new() -> Self {
        NjCriterion
    }
}

fn nj_branch_lengths<T: NjFloat>(d: T, total_low: T, total_high: T, rank: usize) -> (T, T) {
    // rank is at least 3 here, so the divisor is positive.
    let divisor = T::from_f64(2.0 * (rank as f64 - 2.0));
    let length_low = d * half() + (total_low - total_high) / divisor;
    (length_low, d - length_low)
}

fn nj_finish_three_lengths<T: NjFloat>(d01: T, d02: T, d12: T) -> (T, T, T) {
    let h = half::<T>();
    (
        (d01 + d02 - d12) * h,
        (d01 + d12 - d02) * h,
        (d02 + d12 - d01) * h,
    )
}

impl<T: NjFloat> JoinCriterion<T> for NjCriterion {
    fn uses_row_totals(&self) -> bool {
        true
    }

    fn branch_lengths(
        &self,
        d: T,
        total_low: T,
        total_high: T,
        _size_low: usize,
        _size_high: usize,
        rank: usize,
    ) -> (T, T) {
        nj_branch_lengths(d, total_low, total_high, rank)
    }

    fn merge_coefficients(
        &mut self,
        _low: usize,
        _high: usize,
        d: T,
        _size_low: usize,
        _size_high: usize,
        _rank: usize,
    ) -> (T, T, T) {
        let h = half::<T>();
        (h, h, -(d * h))
    }

    fn finish_three_lengths(&self, d01: T, d02: T, d12: T, _sizes: [usize; 3]) -> (T, T, T) {
        nj_finish_three_lengths(d01, d02, d12)
    }
}

// ============================================================================
// UNJ
// ============================================================================

/// Unweighted Neighbor Joining (Gascuel 1997): the NJ criterion and branch
/// lengths with a leaf-count-weighted row merge.
#[derive(Debug, Default)]
pub struct UnjCriterion;

impl UnjCriterion {
    pub fn new() -> Self {
        UnjCriterion
    }
}

impl<T: NjFloat> JoinCriterion<T> for UnjCriterion {
    fn uses_row_totals(&self) -> bool {
        true
    }

    fn branch_lengths(
        &self,
        d: T,
        total_low: T,
        total_high: T,
        _size_low: usize,
        _size_high: usize,
        rank: usize,
    ) -> (T, T) {
        nj_branch_lengths(d, total_low, total_high, rank)
    }

    fn merge_coefficients(
        &mut self,
        _low: usize,
        _high: usize,
        d: T,
        size_low: usize,
        size_high: usize,
        _rank: usize,
    ) -> (T, T, T) {
        let lambda = T::from_f64(size_low as f64 / (size_low + size_high) as f64);
        (lambda, T::one() - lambda, -(d * half()))
    }

    fn finish_three_lengths(&self, d01: T, d02: T, d12: T, _sizes: [usize; 3]) -> (T, T, T) {
        nj_finish_three_lengths(d01, d02, d12)
    }
}

// ============================================================================
// BIONJ
// ============================================================================

/// BIONJ (Gascuel 1997): NJ scores and branch lengths, with a variance
/// matrix choosing the row-merge weight that minimizes the variance of the
/// merged distances.
#[derive(Debug)]
pub struct BionjCriterion<T> {
    variance: SquareMatrix<T>,
    last_lambda: Option<T>,
}

impl<T: NjFloat> BionjCriterion<T> {
    pub fn new() -> Self {
        BionjCriterion {
            variance: SquareMatrix::new(),
            last_lambda: None,
        }
    }

    /// Variance-minimizing weight, clamped to [0, 1]:
    /// `1/2 + sum_k (V[high][k] - V[low][k]) / (2 (rank-2) V[low][high])`.
    fn lambda(&self, low: usize, high: usize, rank: usize) -> T {
        let v_pair = self.variance.cell(high, low);
        if v_pair <= T::zero() {
            return half();
        }
        let mut diff_sum = T::zero();
        let row_low = self.variance.row(low);
        let row_high = self.variance.row(high);
        for k in 0..rank {
            if k != low && k != high {
                diff_sum = diff_sum + (row_high[k] - row_low[k]);
            }
        }
        let divisor = T::from_f64(2.0 * (rank as f64 - 2.0)) * v_pair;
        let lambda = half::<T>() + diff_sum / divisor;
        lambda.max(T::zero()).min(T::one())
    }
}

impl<T: NjFloat> JoinCriterion<T> for BionjCriterion<T> {
    fn uses_row_totals(&self) -> bool {
        true
    }

    /// The variance matrix starts as a copy of the distance matrix.
    fn prepare(&mut self, matrix: &SquareMatrix<T>) {
        let n = matrix.rank();
        self.variance.set_size(n);
        for i in 0..n {
            let source = matrix.row(i);
            let target = self.variance.row_mut(i);
            target[..n].copy_from_slice(&source[..n]);
        }
        self.last_lambda = None;
    }

    fn branch_lengths(
        &self,
        d: T,
        total_low: T,
        total_high: T,
        _size_low: usize,
        _size_high: usize,
        rank: usize,
    ) -> (T, T) {
        nj_branch_lengths(d, total_low, total_high, rank)
    }

    fn merge_coefficients(
        &mut self,
        low: usize,
        high: usize,
        d: T,
        _size_low: usize,
        _size_high: usize,
        rank: usize,
    ) -> (T, T, T) {
        let lambda = self.lambda(low, high, rank);
        self.last_lambda = Some(lambda);
        let mu = T::one() - lambda;
        (lambda, mu, -(lambda * mu * d))
    }

    /// Applies the matching reduction to the variance matrix:
    /// `V[c][k] = lambda V[low][k] + mu V[high][k] - lambda mu V[low][high]`.
    fn after_merge(&mut self, low: usize, high: usize) {
        let lambda = match self.last_lambda.take() {
            Some(l) => l,
            None => half(),
        };
        let mu = T::one() - lambda;
        let rank = self.variance.rank();
        let v_pair = self.variance.cell(high, low);
        let shift = lambda * mu * v_pair;
        for k in 0..rank {
            if k != low && k != high {
                let merged =
                    lambda * self.variance.cell(low, k) + mu * self.variance.cell(high, k) - shift;
                self.variance.set_symmetric(low, k, merged);
            }
        }
        self.variance.set_symmetric(low, low, T::zero());
    }

    fn compact(&mut self, k: usize) {
        self.variance.remove_row_and_column(k);
    }

    fn finish_three_lengths(&self, d01: T, d02: T, d12: T, _sizes: [usize; 3]) -> (T, T, T) {
        nj_finish_three_lengths(d01, d02, d12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgma_splits_the_distance_evenly() {
        let c = UpgmaCriterion::new();
        let (a, b) = JoinCriterion::<f64>::branch_lengths(&c, 3.0, 0.0, 0.0, 1, 1, 4);
        assert_eq!((a, b), (1.5, 1.5));
    }

    #[test]
    fn upgma_merge_weights_by_size() {
        let mut c = UpgmaCriterion::new();
        let (lambda, mu, delta) = JoinCriterion::<f64>::merge_coefficients(&mut c, 0, 1, 2.0, 3, 1, 5);
        assert!((lambda - 0.75).abs() < 1e-12);
        assert!((mu - 0.25).abs() < 1e-12);
        assert_eq!(delta, 0.0);
    }

    #[test]
    fn nj_branch_lengths_use_total_difference() {
        let c = NjCriterion::new();
        // d=0.3, totals 1.3 / 1.5, rank 4: length_low = 0.15 - 0.2/4 = 0.1
        let (a, b) = JoinCriterion::<f64>::branch_lengths(&c, 0.3, 1.3, 1.5, 1, 1, 4);
        assert!((a - 0.1).abs() < 1e-12);
        assert!((b - 0.2).abs() < 1e-12);
    }

    #[test]
    fn nj_three_way_halving() {
        let c = NjCriterion::new();
        let (a, b, d) = c.finish_three_lengths(1.0, 1.0, 1.0, [1, 1, 1]);
        assert_eq!((a, b, d), (0.5, 0.5, 0.5));
    }

    #[test]
    fn bionj_lambda_is_half_on_uniform_variance() {
        let mut c: BionjCriterion<f64> = BionjCriterion::new();
        let flat = [
            0.0, 1.0, 1.0, 1.0, //
            1.0, 0.0, 1.0, 1.0, //
            1.0, 1.0, 0.0, 1.0, //
            1.0, 1.0, 1.0, 0.0,
        ];
        let mut m = SquareMatrix::new();
        m.set_size(4);
        m.load_from_flat(&flat);
        JoinCriterion::<f64>::prepare(&mut c, &m);
        let (lambda, mu, delta) = c.merge_coefficients(0, 1, 1.0, 1, 1, 4);
        assert!((lambda - 0.5).abs() < 1e-12);
        assert!((mu - 0.5).abs() < 1e-12);
        assert!((delta + 0.25).abs() < 1e-12);
    }

    #[test]
    fn bionj_variance_follows_compaction() {
        let mut c: BionjCriterion<f64> = BionjCriterion::new();
        let flat = [
            0.0, 2.0, 4.0, //
            2.0, 0.0, 6.0, //
            4.0, 6.0, 0.0,
        ];
        let mut m = SquareMatrix::new();
        m.set_size(3);
        m.load_from_flat(&flat);
        JoinCriterion::<f64>::prepare(&mut c, &m);
        let _ = c.merge_coefficients(0, 1, 2.0, 1, 1, 3);
        JoinCriterion::<f64>::after_merge(&mut c, 0, 1);
        JoinCriterion::<f64>::compact(&mut c, 1);
        assert_eq!(c.variance.rank(), 2);
        assert!(c.variance.check_symmetry_and_padding());
    }
}
