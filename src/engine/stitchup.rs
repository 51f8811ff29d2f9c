//! The family stitch-up builder.
//!
//! Stitch-up lets the leaf distances alone decide the topology: every pair of
//! taxa is a candidate edge in a min-heap; the shortest edge between two
//! not-yet-connected families adds a "staple" (two new interior nodes, one on
//! the end of each family's caterpillar chain, joined by an arch), and a
//! union-find tracks connectedness. Once every leaf is connected, interior
//! nodes of degree 2 are contracted away.
//!
//! Equal-length edges pop in the order of a deterministic hash of their
//! (row, column) endpoints, so output is reproducible across runs, platforms
//! and thread counts.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, BTreeMap};
use std::cmp::Reverse;

use crate::defaults::{STAPLE_ARCH, STAPLE_LEG};
use crate::errors::TreeBuildError;
use crate::matrix::SquareMatrix;
use crate::options::BuildOpt;
use crate::tree::forest::format_length;
use crate::utils::hash_64;

use super::check_cancelled;

/// A candidate edge ordered by (length, endpoint hash).
#[derive(Debug, Clone, Copy, PartialEq)]
struct LengthSortedStitch {
    length: f64,
    tiebreak: u64,
    source: usize,
    destination: usize,
}

impl LengthSortedStitch {
    fn new(source: usize, destination: usize, length: f64) -> Self {
        LengthSortedStitch {
            length,
            tiebreak: hash_64(((source as u64) << 32) | destination as u64),
            source,
            destination,
        }
    }
}

impl Eq for LengthSortedStitch {}

impl PartialOrd for LengthSortedStitch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LengthSortedStitch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.length
            .total_cmp(&other.length)
            .then_with(|| self.tiebreak.cmp(&other.tiebreak))
            .then_with(|| (self.source, self.destination).cmp(&(other.source, other.destination)))
    }
}

/// The intermediate stitch graph: leaves first, interior nodes appended as
/// staples land. Directed edges are kept symmetric in a sorted map.
pub(crate) struct StitchupGraph {
    leaf_names: Vec<String>,
    stitches: BTreeMap<(usize, usize), f64>,
    /// Union-find over leaf families, size-biased.
    parent: Vec<usize>,
    family_size: Vec<usize>,
    /// End of each taxon's caterpillar chain.
    tip: Vec<usize>,
    /// Leg length of the most recent staple on each taxon's chain.
    tip_distance: Vec<f64>,
    node_count: usize,
}

impl StitchupGraph {
    pub(crate) fn new(names: &[String]) -> Self {
        let n = names.len();
        StitchupGraph {
            leaf_names: names.to_vec(),
            stitches: BTreeMap::new(),
            parent: (0..n).collect(),
            family_size: vec![1; n],
            tip: (0..n).collect(),
            tip_distance: vec![0.0; n],
            node_count: n,
        }
    }

    /// Root of a leaf's family. No path compression; the grouping depends
    /// only on the union sequence, not on query order.
    fn find(&self, leaf: usize) -> usize {
        let mut node = leaf;
        while self.parent[node] != node {
            node = self.parent[node];
        }
        node
    }

    pub(crate) fn same_family(&self, leaf_a: usize, leaf_b: usize) -> bool {
        self.find(leaf_a) == self.find(leaf_b)
    }

    /// Size-biased union; equal sizes attach the higher root under the lower
    /// so the grouping is independent of insertion order.
    fn union(&mut self, leaf_a: usize, leaf_b: usize) {
        let root_a = self.find(leaf_a);
        let root_b = self.find(leaf_b);
        if root_a == root_b {
            return;
        }
        let (keep, absorb) = match self.family_size[root_a].cmp(&self.family_size[root_b]) {
            Ordering::Greater => (root_a, root_b),
            Ordering::Less => (root_b, root_a),
            Ordering::Equal => (root_a.min(root_b), root_a.max(root_b)),
        };
        self.parent[absorb] = keep;
        self.family_size[keep] += self.family_size[absorb];
    }

    fn stitch_link(&mut self, node_a: usize, node_b: usize, length: f64) {
        self.stitches.insert((node_a, node_b), length);
        self.stitches.insert((node_b, node_a), length);
    }

    /// Staples two families together across leaves `a` and `b` at observed
    /// distance `length`.
    pub(crate) fn staple(&mut self, leaf_a: usize, leaf_b: usize, length: f64) {
        let interior_a = self.node_count;
        let leg_a = (length - self.tip_distance[leaf_a]) * STAPLE_LEG;
        self.stitch_link(self.tip[leaf_a], interior_a, leg_a);
        self.tip[leaf_a] = interior_a;
        self.tip_distance[leaf_a] = leg_a;
        self.node_count += 1;

        let interior_b = self.node_count;
        let leg_b = (length - self.tip_distance[leaf_b]) * STAPLE_LEG;
        self.stitch_link(self.tip[leaf_b], interior_b, leg_b);
        self.tip[leaf_b] = interior_b;
        self.tip_distance[leaf_b] = leg_b;
        self.node_count += 1;

        self.stitch_link(interior_a, interior_b, length * STAPLE_ARCH);
        self.union(leaf_a, leaf_b);
    }

    /// Contracts interior nodes of degree 2, directly linking their two
    /// neighbours with the summed edge length. One pass in (source,
    /// destination) order; idempotent under re-application.
    pub(crate) fn contract_degree_two(&mut self) {
        let leaf_count = self.leaf_names.len();
        let mut replacements: Vec<usize> = (0..self.node_count).collect();
        let mut replacement_lengths = vec![0.0f64; self.node_count];

        let mut current: Option<usize> = None;
        let mut degree = 0usize;
        for (&(source, destination), &length) in &self.stitches {
            if current != Some(source) {
                if let Some(node) = current {
                    if degree != 2 || node < leaf_count {
                        replacements[node] = node;
                        replacement_lengths[node] = 0.0;
                    }
                }
                current = Some(source);
                degree = 1;
                if destination < source {
                    // Sorted order means this is the lowest-numbered
                    // neighbour.
                    replacements[source] = destination;
                    replacement_lengths[source] = length;
                }
            } else {
                degree += 1;
            }
        }
        if let Some(node) = current {
            if degree != 2 || node < leaf_count {
                replacements[node] = node;
                replacement_lengths[node] = 0.0;
            }
        }

        let old_stitches = std::mem::take(&mut self.stitches);
        for ((source, destination), length) in old_stitches {
            let new_source = replacements[source];
            let new_destination = replacements[destination];
            if new_source != new_destination {
                let total =
                    length + replacement_lengths[source] + replacement_lengths[destination];
                self.stitches.insert((new_source, new_destination), total);
            }
        }
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.stitches.len()
    }

    pub(crate) fn edges(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.stitches.iter().map(|(&(s, d), &l)| (s, d, l))
    }

    /// Serializes the contracted graph from its highest-numbered node.
    pub(crate) fn write_newick(&self, precision: usize, subtree_only: bool) -> String {
        let mut out = String::new();
        let root = match self.stitches.keys().map(|&(s, _)| s).max() {
            Some(root) => root,
            None => return out,
        };
        let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); root + 1];
        for (&(source, destination), &length) in &self.stitches {
            if source <= root && destination <= root {
                adjacency[source].push((destination, length));
            }
        }
        self.write_subtree(&adjacency, root, usize::MAX, subtree_only, precision, &mut out);
        if !subtree_only {
            out.push(';');
        }
        out
    }

    fn write_subtree(
        &self,
        adjacency: &[Vec<(usize, f64)>],
        node: usize,
        came_from: usize,
        no_brackets: bool,
        precision: usize,
        out: &mut String,
    ) {
        if node < self.leaf_names.len() {
            out.push_str(&self.leaf_names[node]);
            return;
        }
        if !no_brackets {
            out.push('(');
        }
        let mut sep = "";
        for &(child, length) in &adjacency[node] {
            if child == came_from {
                continue;
            }
            out.push_str(sep);
            sep = ",";
            self.write_subtree(adjacency, child, node, false, precision, out);
            out.push(':');
            format_length(length, precision, out);
        }
        if !no_brackets {
            out.push(')');
        }
    }
}

/// Runs the full stitch-up build: heap, staples, contraction, Newick.
pub(crate) fn build_stitchup_tree(
    names: &[String],
    flat: &[f64],
    opt: &BuildOpt,
) -> Result<String, TreeBuildError> {
    let n = names.len();
    let mut matrix: SquareMatrix<f64> = SquareMatrix::new();
    matrix.set_size(n);
    matrix.load_from_flat(flat);

    // Phase A: every pair is a candidate edge.
    let mut edges = Vec::with_capacity(n * (n - 1) / 2);
    for row in 1..n {
        let data = matrix.row(row);
        for (col, &d) in data.iter().enumerate().take(row) {
            edges.push(Reverse(LengthSortedStitch::new(row, col, d)));
        }
    }
    let heap_size = edges.len();
    let mut heap = BinaryHeap::from(edges);
    log::debug!("Stitch-up heap holds {} candidate edges", heap_size);

    // Phase B: stitch the n-1 shortest cross-family edges.
    let mut graph = StitchupGraph::new(names);
    let mut iterations = 0usize;
    for _join in 0..n - 1 {
        check_cancelled(opt.cancel.as_ref())?;
        let shortest = loop {
            let Reverse(candidate) = match heap.pop() {
                Some(edge) => edge,
                None => {
                    return Err(TreeBuildError::Internal(
                        "edge heap exhausted before the graph was connected".to_string(),
                    ))
                }
            };
            iterations += 1;
            if !graph.same_family(candidate.source, candidate.destination) {
                break candidate;
            }
            if iterations > heap_size {
                return Err(TreeBuildError::Internal(
                    "edge heap cycled without connecting the graph".to_string(),
                ));
            }
        };
        graph.staple(shortest.source, shortest.destination, shortest.length);
    }

    // Phase C: contract the through-through nodes.
    graph.contract_degree_two();
    Ok(graph.write_newick(opt.precision, opt.subtree_only))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn graph_snapshot(graph: &StitchupGraph) -> Vec<(usize, usize, u64)> {
        graph
            .edges()
            .map(|(s, d, l)| (s, d, l.to_bits()))
            .collect()
    }

    #[test]
    fn union_grouping_ignores_insertion_order() {
        let labels = names(&["a", "b", "c", "d"]);
        let mut one = StitchupGraph::new(&labels);
        one.union(0, 1);
        one.union(2, 3);
        one.union(0, 3);
        let mut two = StitchupGraph::new(&labels);
        two.union(2, 3);
        two.union(0, 1);
        two.union(3, 0);
        for leaf in 0..4 {
            assert_eq!(one.find(leaf), two.find(leaf));
        }
    }

    #[test]
    fn staple_keeps_edges_symmetric() {
        let labels = names(&["a", "b", "c"]);
        let mut graph = StitchupGraph::new(&labels);
        graph.staple(0, 1, 3.0);
        for (s, d, l) in graph.edges().collect::<Vec<_>>() {
            let mirrored = graph.edges().find(|&(s2, d2, _)| (s2, d2) == (d, s));
            assert_eq!(mirrored.map(|(_, _, l2)| l2), Some(l));
        }
        // Leg + leg + arch = 3 edges, stored both ways.
        assert_eq!(graph.edge_count(), 6);
    }

    #[test]
    fn contraction_is_idempotent() {
        let labels = names(&["a", "b", "c", "d"]);
        let mut graph = StitchupGraph::new(&labels);
        graph.staple(0, 1, 1.0);
        graph.staple(2, 3, 2.0);
        graph.staple(0, 2, 5.0);
        graph.contract_degree_two();
        let first = graph_snapshot(&graph);
        graph.contract_degree_two();
        assert_eq!(first, graph_snapshot(&graph));
    }

    #[test]
    fn stitchup_tree_contains_every_leaf_once() {
        let labels = names(&["alpha", "beta", "gamma", "delta", "epsilon"]);
        let mut flat = vec![0.0; 25];
        let distances = [
            (0usize, 1usize, 2.0),
            (0, 2, 7.0),
            (0, 3, 7.5),
            (0, 4, 8.0),
            (1, 2, 7.2),
            (1, 3, 7.7),
            (1, 4, 8.2),
            (2, 3, 3.0),
            (2, 4, 3.5),
            (3, 4, 1.5),
        ];
        for &(i, j, d) in &distances {
            flat[i * 5 + j] = d;
            flat[j * 5 + i] = d;
        }
        let newick = build_stitchup_tree(&labels, &flat, &BuildOpt::new()).unwrap();
        assert!(newick.ends_with(';'));
        for name in &labels {
            assert_eq!(newick.matches(name.as_str()).count(), 1, "{}", newick);
        }
    }

    #[test]
    fn equal_length_edges_pop_deterministically() {
        let a = LengthSortedStitch::new(3, 1, 2.5);
        let b = LengthSortedStitch::new(4, 2, 2.5);
        let again_a = LengthSortedStitch::new(3, 1, 2.5);
        assert_eq!(a.cmp(&b), a.cmp(&b));
        assert_eq!(a, again_a);
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }
}
