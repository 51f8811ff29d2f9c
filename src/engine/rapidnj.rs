//! Sorted-candidate acceleration for the NJ-family engines (RapidNJ), plus
//! the auction row-visiting order.
//!
//! Each active row keeps a permutation of its candidates sorted by raw
//! distance, keyed by cluster id rather than row number so entries survive
//! row swaps. Because raw distance is monotone along a list and the NJ
//! adjustment is bounded by the largest scaled row total, a row's scan can
//! stop as soon as
//!
//! `d - adjust[r] - max_adjust >= best_so_far`
//!
//! since no later candidate in that row can do better. Entries whose cluster
//! has been retired are skipped and dropped on the next rebuild; the merged
//! row's list is rebuilt from scratch after every join. Every active pair
//! stays covered: surviving rows keep their original lists and the new
//! cluster's list names all survivors.

use std::cmp::Ordering;

use crate::compute::scalar::NjFloat;
use crate::matrix::SquareMatrix;

use super::criteria::JoinCriterion;
use super::{imbalance_of, JoinEngine, Position};

/// Per-row sorted candidate lists plus the cluster-to-row mapping that
/// detects stale entries.
pub(crate) struct RapidIndex<T> {
    /// `entries[row]` is (raw distance, cluster id) ascending by distance.
    entries: Vec<Vec<(T, u32)>>,
    /// Row currently occupied by each cluster id; `None` once retired.
    cluster_to_row: Vec<Option<u32>>,
}

impl<T: NjFloat> RapidIndex<T> {
    pub(crate) fn new(matrix: &SquareMatrix<T>, row_to_cluster: &[usize]) -> Self {
        let n = matrix.rank();
        let mut index = RapidIndex {
            entries: Vec::with_capacity(n),
            cluster_to_row: vec![None; n],
        };
        for (row, &cluster) in row_to_cluster.iter().enumerate().take(n) {
            index.cluster_to_row[cluster] = Some(row as u32);
            index.entries.push(Vec::new());
        }
        for row in 0..n {
            index.rebuild_row(row, matrix, row_to_cluster);
        }
        index
    }

    /// Rebuilds one row's list from the matrix, naming every other active
    /// cluster.
    fn rebuild_row(&mut self, row: usize, matrix: &SquareMatrix<T>, row_to_cluster: &[usize]) {
        let rank = matrix.rank();
        let data = matrix.row(row);
        let list = &mut self.entries[row];
        list.clear();
        list.reserve(rank.saturating_sub(1));
        for k in 0..rank {
            if k != row {
                list.push((data[k], row_to_cluster[k] as u32));
            }
        }
        list.sort_unstable_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
    }

    fn row_of(&self, cluster: u32) -> Option<usize> {
        self.cluster_to_row
            .get(cluster as usize)
            .copied()
            .flatten()
            .map(|r| r as usize)
    }

    fn retire(&mut self, cluster: usize) {
        self.cluster_to_row[cluster] = None;
    }

    fn place(&mut self, cluster: usize, row: usize) {
        if self.cluster_to_row.len() <= cluster {
            self.cluster_to_row.resize(cluster + 1, None);
        }
        self.cluster_to_row[cluster] = Some(row as u32);
    }

    /// First live candidate distance in a row's list, for the auction order.
    fn head_distance(&self, row: usize) -> Option<T> {
        for &(d, cluster) in &self.entries[row] {
            if let Some(partner) = self.row_of(cluster) {
                if partner != row {
                    return Some(d);
                }
            }
        }
        None
    }
}

impl<T: NjFloat, C: JoinCriterion<T>> JoinEngine<T, C> {
    /// Candidate search over the sorted lists. With `auction` set, rows are
    /// visited cheapest-head-first so the cutoff tightens early; otherwise in
    /// row order. Either way the cutoff is conservative, so the returned
    /// entry is the exact minimum under the usual
    /// (value, imbalance, row, column) order.
    pub(crate) fn rapid_minimum_entry(&mut self, auction: bool) -> Position<T> {
        let rank = self.matrix.rank();
        let divisor = T::from_f64(rank as f64 - 2.0);
        self.adjusted_totals.clear();
        self.adjusted_totals
            .extend(self.totals[..rank].iter().map(|&t| t / divisor));
        let adjusted = &self.adjusted_totals;
        let mut max_adjust = T::zero();
        for &a in adjusted.iter() {
            max_adjust = max_adjust.max(a);
        }

        let rapid = match &self.rapid {
            Some(rapid) => rapid,
            None => return Position::infinite(),
        };

        let order: Vec<usize> = if auction {
            let mut heads: Vec<(T, usize)> = (0..rank)
                .map(|row| {
                    (
                        rapid.head_distance(row).unwrap_or(T::INFINITE_DISTANCE),
                        row,
                    )
                })
                .collect();
            heads.sort_unstable_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.1.cmp(&b.1))
            });
            heads.into_iter().map(|(_, row)| row).collect()
        } else {
            (0..rank).collect()
        };

        let mut best = Position::infinite();
        for r in order {
            let adjust_r = adjusted[r];
            for &(d, cluster) in &rapid.entries[r] {
                if d - adjust_r - max_adjust >= best.value {
                    break;
                }
                let partner = match rapid.row_of(cluster) {
                    Some(partner) if partner != r => partner,
                    _ => continue,
                };
                let value = d - adjust_r - adjusted[partner];
                let (row, column) = if partner < r { (r, partner) } else { (partner, r) };
                let candidate = Position {
                    row,
                    column,
                    value,
                    imbalance: imbalance_of(&self.forest, &self.row_to_cluster, row, column),
                };
                if candidate.better_than(&best) {
                    best = candidate;
                }
            }
        }
        best
    }

    /// Post-join reconciliation: retire the two parents, register the merged
    /// cluster at row `low`, mirror the matrix's swap-with-last removal of
    /// row `high`, and rebuild the merged row's list.
    pub(crate) fn reconcile_rapid_index(
        &mut self,
        low: usize,
        high: usize,
        cluster_low: usize,
        cluster_high: usize,
        new_cluster: usize,
    ) {
        let rank = self.matrix.rank();
        let rapid = match &mut self.rapid {
            Some(rapid) => rapid,
            None => return,
        };
        rapid.retire(cluster_low);
        rapid.retire(cluster_high);
        rapid.place(new_cluster, low);

        debug_assert_eq!(rapid.entries.len(), rank + 1);
        rapid.entries.swap_remove(high);
        if high < rank {
            // A row was swapped down into the vacated slot.
            rapid.place(self.row_to_cluster[high], high);
        }
        rapid.rebuild_row(low, &self.matrix, &self.row_to_cluster);
    }
}
