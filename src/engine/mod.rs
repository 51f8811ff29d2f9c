//! Tree-construction engines.
//!
//! `JoinEngine` is the agglomerative driver shared by the UPGMA/NJ/BIONJ/UNJ
//! family: it owns the matrix, row totals, row-to-cluster mapping and cluster
//! forest, runs the join loop, and delegates the algorithm-specific pieces to
//! a [`JoinCriterion`]. Candidate search is a capability selected at
//! construction: scalar scan, vectorized scan, or the sorted / auction scans
//! from the rapidnj module. The stitchup and ntcj modules hold the
//! heap-driven builders.

pub mod criteria;
pub mod ntcj;
pub mod rapidnj;
pub mod stitchup;

use rayon::prelude::*;

use crate::compute::row_min::row_minimum;
use crate::compute::scalar::NjFloat;
use crate::compute::simd::SimdLevel;
use crate::defaults::PARALLEL_MIN_ROWS;
use crate::errors::TreeBuildError;
use crate::matrix::SquareMatrix;
use crate::options::CancelFlag;
use crate::tree::ClusterForest;

use criteria::JoinCriterion;
use rapidnj::RapidIndex;

/// How the engine searches for the minimum-scoring candidate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Scalar scan of each row's lower triangle.
    Scalar,
    /// Block-parallel SIMD scan at the given level.
    Vectorized(SimdLevel),
    /// Per-row sorted candidate lists with cutoff pruning (RapidNJ).
    Sorted,
    /// Sorted lists, visiting the most promising rows first.
    Auction,
}

/// A candidate position in the matrix: column strictly less than row.
///
/// Candidates order by (value, imbalance, row, column); the imbalance term
/// steers ties away from degenerate trees when many taxa are identical, and
/// the final lexicographic terms make tie-breaking stable and observable.
#[derive(Debug, Clone, Copy)]
pub struct Position<T> {
    pub row: usize,
    pub column: usize,
    pub value: T,
    pub imbalance: usize,
}

impl<T: NjFloat> Position<T> {
    fn infinite() -> Self {
        Position {
            row: 0,
            column: 0,
            value: T::INFINITE_DISTANCE,
            imbalance: usize::MAX,
        }
    }

    pub(crate) fn better_than(&self, other: &Position<T>) -> bool {
        if self.value != other.value {
            return self.value < other.value;
        }
        if self.imbalance != other.imbalance {
            return self.imbalance < other.imbalance;
        }
        (self.row, self.column) < (other.row, other.column)
    }
}

/// Leaf-count difference between the clusters occupying two rows.
pub(crate) fn imbalance_of(
    forest: &ClusterForest,
    row_to_cluster: &[usize],
    row_a: usize,
    row_b: usize,
) -> usize {
    let size_a = forest.leaf_count(row_to_cluster[row_a]);
    let size_b = forest.leaf_count(row_to_cluster[row_b]);
    size_a.abs_diff(size_b)
}

/// The agglomerative join-loop driver.
pub struct JoinEngine<T: NjFloat, C: JoinCriterion<T>> {
    criterion: C,
    search: SearchStrategy,
    rooted: bool,
    matrix: SquareMatrix<T>,
    totals: Vec<T>,
    row_to_cluster: Vec<usize>,
    forest: ClusterForest,
    adjusted_totals: Vec<T>,
    column_numbers: Vec<T>,
    row_minima: Vec<Position<T>>,
    merge_scratch: Vec<T>,
    rapid: Option<RapidIndex<T>>,
}

impl<T: NjFloat, C: JoinCriterion<T>> JoinEngine<T, C> {
    pub fn new(criterion: C, search: SearchStrategy, rooted: bool) -> Self {
        JoinEngine {
            criterion,
            search,
            rooted,
            matrix: SquareMatrix::new(),
            totals: Vec::new(),
            row_to_cluster: Vec::new(),
            forest: ClusterForest::new(),
            adjusted_totals: Vec::new(),
            column_numbers: Vec::new(),
            row_minima: Vec::new(),
            merge_scratch: Vec::new(),
            rapid: None,
        }
    }

    /// Loads taxon names and a validated flat distance buffer. Row `i`
    /// corresponds to leaf cluster `i`.
    pub fn load(&mut self, names: &[String], flat: &[f64]) {
        let n = names.len();
        self.matrix.set_size(n);
        self.matrix.load_from_flat(flat);
        self.matrix.compute_row_totals(&mut self.totals);
        self.forest.clear();
        self.row_to_cluster.clear();
        for (i, name) in names.iter().enumerate() {
            let id = self.forest.add_leaf(name);
            debug_assert_eq!(id, i);
            self.row_to_cluster.push(id);
        }
        self.column_numbers.clear();
        self.column_numbers
            .extend((0..n).map(|c| T::from_f64(c as f64)));
        self.criterion.prepare(&self.matrix);
        self.rapid = match self.search {
            SearchStrategy::Sorted | SearchStrategy::Auction => {
                Some(RapidIndex::new(&self.matrix, &self.row_to_cluster))
            }
            _ => None,
        };
    }

    pub fn forest(&self) -> &ClusterForest {
        &self.forest
    }

    pub(crate) fn rank(&self) -> usize {
        self.matrix.rank()
    }

    /// Runs the join loop down to the terminal link.
    pub fn construct_tree(&mut self, cancel: Option<&CancelFlag>) -> Result<(), TreeBuildError> {
        let stop_rank = if self.rooted { 2 } else { 3 };
        while self.matrix.rank() > stop_rank {
            check_cancelled(cancel)?;
            let best = self.get_minimum_entry()?;
            self.cluster(best.column, best.row)?;
        }
        if self.rooted {
            self.finish_two()
        } else {
            self.finish_three()
        }
    }

    /// Finds the minimum-scoring candidate under the configured search
    /// strategy.
    pub(crate) fn get_minimum_entry(&mut self) -> Result<Position<T>, TreeBuildError> {
        let best = match self.search {
            SearchStrategy::Sorted => self.rapid_minimum_entry(false),
            SearchStrategy::Auction => self.rapid_minimum_entry(true),
            _ => {
                self.get_row_minima();
                let mut best = Position::infinite();
                for candidate in &self.row_minima {
                    if candidate.better_than(&best) {
                        best = *candidate;
                    }
                }
                best
            }
        };
        if best.value >= T::INFINITE_DISTANCE {
            return Err(TreeBuildError::NumericalBreakdown {
                row: best.row,
                column: best.column,
                detail: "no finite candidate pair remains".to_string(),
            });
        }
        Ok(best)
    }

    /// Scans every row's lower triangle for its cheapest candidate. Rows are
    /// independent and dispatched across the rayon pool; the serial reduction
    /// afterwards fixes the ordering regardless of thread count.
    fn get_row_minima(&mut self) {
        let rank = self.matrix.rank();
        let use_totals = self.criterion.uses_row_totals();
        if use_totals {
            let divisor = T::from_f64(rank as f64 - 2.0);
            self.adjusted_totals.clear();
            self.adjusted_totals
                .extend(self.totals[..rank].iter().map(|&t| t / divisor));
        }
        let adjust: Option<&[T]> = if use_totals {
            Some(&self.adjusted_totals)
        } else {
            None
        };
        let matrix = &self.matrix;
        let forest = &self.forest;
        let row_to_cluster = &self.row_to_cluster[..rank];
        let column_numbers = &self.column_numbers;
        let search = self.search;

        self.row_minima.clear();
        self.row_minima.resize(rank, Position::infinite());
        self.row_minima
            .par_iter_mut()
            .enumerate()
            .with_min_len(PARALLEL_MIN_ROWS)
            .for_each(|(row, slot)| {
                if row == 0 {
                    return;
                }
                let level = match search {
                    SearchStrategy::Vectorized(level) => level,
                    _ => SimdLevel::Scalar,
                };
                let found = row_minimum(level, matrix.row(row), adjust, column_numbers, row);
                let value = match adjust {
                    Some(adj) => found.value - adj[row],
                    None => found.value,
                };
                *slot = Position {
                    row,
                    column: found.column,
                    value,
                    imbalance: imbalance_of(forest, row_to_cluster, row, found.column),
                };
            });
    }

    /// Joins the clusters at rows `low < high`: appends the new cluster,
    /// writes the merged row over row `low`, updates totals, and removes row
    /// `high` by swap-with-last.
    pub(crate) fn cluster(&mut self, low: usize, high: usize) -> Result<(), TreeBuildError> {
        debug_assert!(low < high);
        let rank = self.matrix.rank();
        let d = self.matrix.cell(high, low);
        let cluster_low = self.row_to_cluster[low];
        let cluster_high = self.row_to_cluster[high];
        let size_low = self.forest.leaf_count(cluster_low);
        let size_high = self.forest.leaf_count(cluster_high);

        let (length_low, length_high) = self.criterion.branch_lengths(
            d,
            self.totals[low],
            self.totals[high],
            size_low,
            size_high,
            rank,
        );
        let (lambda, mu, delta) =
            self.criterion
                .merge_coefficients(low, high, d, size_low, size_high, rank);

        // Phase 1: merged distances into scratch. Reads only; rows are
        // written between kernels, never inside one.
        self.merge_scratch.clear();
        self.merge_scratch.resize(rank, T::zero());
        {
            let row_low = self.matrix.row(low);
            let row_high = self.matrix.row(high);
            self.merge_scratch
                .par_iter_mut()
                .enumerate()
                .with_min_len(PARALLEL_MIN_ROWS)
                .for_each(|(k, slot)| {
                    if k != low && k != high {
                        *slot = lambda * row_low[k] + mu * row_high[k] + delta;
                    }
                });
        }
        for (k, &merged) in self.merge_scratch.iter().enumerate() {
            if k != low && k != high && (!merged.is_finite() || merged >= T::INFINITE_DISTANCE) {
                return Err(TreeBuildError::NumericalBreakdown {
                    row: high,
                    column: low,
                    detail: format!("merged distance to row {} is {}", k, merged),
                });
            }
        }

        // Row totals, updated from the pre-merge cells.
        let mut total_low = T::zero();
        for k in 0..rank {
            if k == low || k == high {
                continue;
            }
            let merged = self.merge_scratch[k];
            self.totals[k] =
                self.totals[k] - self.matrix.cell(k, low) - self.matrix.cell(k, high) + merged;
            total_low = total_low + merged;
        }
        self.totals[low] = total_low;

        // Phase 2: write the merged column (row-disjoint, parallel) and the
        // merged row.
        {
            let scratch = &self.merge_scratch;
            self.matrix.rows_mut()[..rank]
                .par_iter_mut()
                .enumerate()
                .with_min_len(PARALLEL_MIN_ROWS)
                .for_each(|(k, row)| {
                    if k != low && k != high {
                        row[low] = scratch[k];
                    }
                });
            let row_low = self.matrix.row_mut(low);
            for (k, &merged) in scratch.iter().enumerate() {
                if k != low && k != high {
                    row_low[k] = merged;
                }
            }
            row_low[low] = T::zero();
        }

        let new_cluster = self.forest.join(
            cluster_low,
            length_low.to_f64(),
            cluster_high,
            length_high.to_f64(),
        );
        self.row_to_cluster[low] = new_cluster;
        self.criterion.after_merge(low, high);
        self.remove_row(high);

        if self.rapid.is_some() {
            self.reconcile_rapid_index(low, high, cluster_low, cluster_high, new_cluster);
        }
        Ok(())
    }

    /// Removes row `high`, keeping totals and the row-to-cluster map in
    /// lock-step with the matrix swap.
    fn remove_row(&mut self, high: usize) {
        let last = self.matrix.rank() - 1;
        self.row_to_cluster[high] = self.row_to_cluster[last];
        self.row_to_cluster.truncate(last);
        self.totals[high] = self.totals[last];
        self.totals.truncate(last);
        self.matrix.remove_row_and_column(high);
        self.criterion.compact(high);
    }

    /// Terminal 3-way link for unrooted trees.
    fn finish_three(&mut self) -> Result<(), TreeBuildError> {
        if self.matrix.rank() != 3 {
            return Err(TreeBuildError::Internal(format!(
                "terminal link requested at rank {}",
                self.matrix.rank()
            )));
        }
        let d01 = self.matrix.cell(1, 0);
        let d02 = self.matrix.cell(2, 0);
        let d12 = self.matrix.cell(2, 1);
        let sizes = [
            self.forest.leaf_count(self.row_to_cluster[0]),
            self.forest.leaf_count(self.row_to_cluster[1]),
            self.forest.leaf_count(self.row_to_cluster[2]),
        ];
        let (l0, l1, l2) = self.criterion.finish_three_lengths(d01, d02, d12, sizes);
        self.forest.join_three(
            self.row_to_cluster[0],
            l0.to_f64(),
            self.row_to_cluster[1],
            l1.to_f64(),
            self.row_to_cluster[2],
            l2.to_f64(),
        );
        Ok(())
    }

    /// 2-way root for rooted trees; the final distance is split evenly.
    fn finish_two(&mut self) -> Result<(), TreeBuildError> {
        if self.matrix.rank() != 2 {
            return Err(TreeBuildError::Internal(format!(
                "root link requested at rank {}",
                self.matrix.rank()
            )));
        }
        let half = self.matrix.cell(1, 0).to_f64() * 0.5;
        self.forest
            .join(self.row_to_cluster[0], half, self.row_to_cluster[1], half);
        Ok(())
    }

    /// Drift check for the incremental row totals, used by tests.
    #[cfg(test)]
    pub(crate) fn totals_drift(&self) -> f64 {
        let mut recomputed = Vec::new();
        self.matrix.compute_row_totals(&mut recomputed);
        let mut worst = 0.0f64;
        for (kept, fresh) in self.totals.iter().zip(recomputed.iter()) {
            worst = worst.max((NjFloat::to_f64(*kept) - NjFloat::to_f64(*fresh)).abs());
        }
        worst
    }
}

pub(crate) fn check_cancelled(cancel: Option<&CancelFlag>) -> Result<(), TreeBuildError> {
    if let Some(flag) = cancel {
        if flag.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(TreeBuildError::Cancelled);
        }
    }
    Ok(())
}
