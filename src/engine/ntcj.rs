//! Nearest-taxon cluster joining.
//!
//! A mash-up of stitch-up and neighbor joining: the NJ-adjusted distances
//! between the original taxa are heaped once, up front, and clusters are
//! joined wherever the cheapest cross-cluster taxon pair points. Joins reuse
//! the NJ cluster step; a taxon-to-row array tracks which matrix row each
//! original taxon's cluster currently occupies.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::errors::TreeBuildError;
use crate::options::BuildOpt;

use super::check_cancelled;
use super::criteria::NjCriterion;
use super::{JoinEngine, SearchStrategy};

/// An edge between two original taxa, ordered by NJ-adjusted distance with a
/// lexicographic tie-break.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TaxonEdge {
    score: f64,
    taxon_low: usize,
    taxon_high: usize,
}

impl Eq for TaxonEdge {}

impl PartialOrd for TaxonEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaxonEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| (self.taxon_low, self.taxon_high).cmp(&(other.taxon_low, other.taxon_high)))
    }
}

/// Builds the tree and returns its Newick serialization.
pub(crate) fn build_ntcj_tree(
    names: &[String],
    flat: &[f64],
    opt: &BuildOpt,
) -> Result<String, TreeBuildError> {
    let mut engine: JoinEngine<f64, NjCriterion> =
        JoinEngine::new(NjCriterion::new(), SearchStrategy::Scalar, opt.rooted);
    engine.load(names, flat);

    let taxon_count = engine.rank();
    let multiplier = 1.0 / taxon_count as f64;

    // Heap every taxon pair by its NJ-adjusted distance against the initial
    // row totals.
    let mut edges = Vec::with_capacity(taxon_count * (taxon_count - 1) / 2);
    for row in 1..taxon_count {
        for col in 0..row {
            let score = engine.initial_pair_score(row, col, multiplier);
            edges.push(Reverse(TaxonEdge {
                score,
                taxon_low: col,
                taxon_high: row,
            }));
        }
    }
    let heap_size = edges.len();
    let mut heap = BinaryHeap::from(edges);

    let mut taxon_to_row: Vec<usize> = (0..taxon_count).collect();
    let stop_rank = if opt.rooted { 2 } else { 3 };
    let mut iterations = 0usize;

    while engine.rank() > stop_rank {
        check_cancelled(opt.cancel.as_ref())?;
        let edge = loop {
            let Reverse(candidate) = match heap.pop() {
                Some(edge) => edge,
                None => {
                    return Err(TreeBuildError::Internal(
                        "taxon-edge heap exhausted before clustering finished".to_string(),
                    ))
                }
            };
            iterations += 1;
            if taxon_to_row[candidate.taxon_low] != taxon_to_row[candidate.taxon_high] {
                break candidate;
            }
            if iterations > heap_size {
                return Err(TreeBuildError::Internal(
                    "taxon-edge heap cycled without joining all clusters".to_string(),
                ));
            }
        };
        let row_a = taxon_to_row[edge.taxon_low];
        let row_b = taxon_to_row[edge.taxon_high];
        let low = row_a.min(row_b);
        let high = row_a.max(row_b);
        engine.cluster(low, high)?;
        // The join merged `high` into `low`, and the matrix swapped its last
        // row down into `high`.
        let moved_row = engine.rank();
        for row in taxon_to_row.iter_mut() {
            if *row == high {
                *row = low;
            } else if *row == moved_row {
                *row = high;
            }
        }
    }

    if opt.rooted {
        engine.finish_two()?;
    } else {
        engine.finish_three()?;
    }
    Ok(engine
        .forest()
        .write_newick(opt.precision, opt.subtree_only))
}

impl JoinEngine<f64, NjCriterion> {
    /// `D(i,j) - (T(i)+T(j)) / N` over the freshly loaded matrix.
    fn initial_pair_score(&self, row: usize, col: usize, multiplier: f64) -> f64 {
        self.matrix.cell(row, col) - (self.totals[row] + self.totals[col]) * multiplier
    }
}
