//! Shared helpers for the integration tests: a minimal Newick parser and
//! topology comparison utilities.
#![allow(dead_code)] // each test binary uses a different subset

use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub enum Node {
    Leaf { name: String, length: f64 },
    Internal { children: Vec<Node>, length: f64 },
}

impl Node {
    pub fn length(&self) -> f64 {
        match self {
            Node::Leaf { length, .. } => *length,
            Node::Internal { length, .. } => *length,
        }
    }
}

/// Parses a single Newick tree. Panics on malformed input; tests only.
pub fn parse_newick(text: &str) -> Node {
    let trimmed = text.trim().trim_end_matches(';');
    let (node, rest) = parse_node(trimmed);
    assert!(rest.is_empty(), "trailing newick text: {:?}", rest);
    node
}

fn parse_node(s: &str) -> (Node, &str) {
    if let Some(inner) = s.strip_prefix('(') {
        let mut children = Vec::new();
        let mut rest = inner;
        loop {
            let (child, after) = parse_node(rest);
            children.push(child);
            match after.as_bytes().first() {
                Some(&b',') => rest = &after[1..],
                Some(&b')') => {
                    rest = &after[1..];
                    break;
                }
                other => panic!("unexpected newick byte {:?}", other),
            }
        }
        let (length, rest) = parse_length(rest);
        (Node::Internal { children, length }, rest)
    } else {
        let end = s
            .find(|c| c == ',' || c == ')' || c == ':')
            .unwrap_or(s.len());
        let name = s[..end].to_string();
        assert!(!name.is_empty(), "empty leaf name in newick");
        let (length, rest) = parse_length(&s[end..]);
        (Node::Leaf { name, length }, rest)
    }
}

fn parse_length(s: &str) -> (f64, &str) {
    match s.strip_prefix(':') {
        None => (0.0, s),
        Some(after) => {
            let end = after
                .find(|c| c == ',' || c == ')' || c == ';')
                .unwrap_or(after.len());
            let value: f64 = after[..end].parse().expect("newick branch length");
            (value, &after[end..])
        }
    }
}

/// Every (leaf name, branch length) pair in the tree.
pub fn leaf_lengths(node: &Node) -> Vec<(String, f64)> {
    let mut out = Vec::new();
    collect_leaves(node, &mut out);
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

fn collect_leaves(node: &Node, out: &mut Vec<(String, f64)>) {
    match node {
        Node::Leaf { name, length } => out.push((name.clone(), *length)),
        Node::Internal { children, .. } => {
            for child in children {
                collect_leaves(child, out);
            }
        }
    }
}

/// The set of non-trivial splits induced by the tree's internal edges,
/// canonicalized to the side not containing `reference` so unrooted
/// topologies compare cleanly.
pub fn splits(node: &Node, reference: &str) -> BTreeSet<BTreeSet<String>> {
    let all: BTreeSet<String> = leaf_lengths(node).into_iter().map(|(n, _)| n).collect();
    let mut out = BTreeSet::new();
    collect_splits(node, &all, reference, true, &mut out);
    out
}

fn collect_splits(
    node: &Node,
    all: &BTreeSet<String>,
    reference: &str,
    is_root: bool,
    out: &mut BTreeSet<BTreeSet<String>>,
) -> BTreeSet<String> {
    match node {
        Node::Leaf { name, .. } => {
            let mut set = BTreeSet::new();
            set.insert(name.clone());
            set
        }
        Node::Internal { children, .. } => {
            let mut clade = BTreeSet::new();
            for child in children {
                clade.extend(collect_splits(child, all, reference, false, out));
            }
            if !is_root && clade.len() > 1 && clade.len() < all.len() - 1 {
                let canonical: BTreeSet<String> = if clade.contains(reference) {
                    all.difference(&clade).cloned().collect()
                } else {
                    clade.clone()
                };
                out.insert(canonical);
            }
            clade
        }
    }
}

/// Convenience: assert that a newick string names each taxon exactly once
/// and carries the expected number of `:length` edges.
pub fn assert_leaf_and_edge_counts(newick: &str, names: &[String], edges: usize) {
    let parsed = parse_newick(newick);
    let leaves = leaf_lengths(&parsed);
    assert_eq!(leaves.len(), names.len(), "leaf count in {}", newick);
    for name in names {
        assert_eq!(
            leaves.iter().filter(|(n, _)| n == name).count(),
            1,
            "taxon {} in {}",
            name,
            newick
        );
    }
    assert_eq!(
        newick.matches(':').count(),
        edges,
        "edge count in {}",
        newick
    );
}

/// A deterministic random symmetric matrix with distinct off-diagonal
/// entries, for permutation and determinism tests.
pub fn random_symmetric_matrix(n: usize, seed: u64) -> Vec<f64> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(seed);
    let mut flat = vec![0.0; n * n];
    for i in 1..n {
        for j in 0..i {
            let d: f64 = rng.gen_range(0.5..10.0);
            flat[i * n + j] = d;
            flat[j * n + i] = d;
        }
    }
    flat
}

pub fn taxon_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("taxon{:02}", i)).collect()
}

/// Generates a random unrooted binary tree over `n` leaves with positive
/// branch lengths, returning its induced additive distance matrix and its
/// non-trivial splits (canonicalized against `reference`).
pub fn random_additive_tree(
    n: usize,
    seed: u64,
    names: &[String],
    reference: &str,
) -> (Vec<f64>, BTreeSet<BTreeSet<String>>) {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    assert!(n >= 3);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut next_node = n;
    // Edges as (node, node, length). Leaves are 0..n.
    let mut edges: Vec<(usize, usize, f64)> = Vec::new();
    let center = next_node;
    next_node += 1;
    for leaf in 0..3 {
        edges.push((center, leaf, rng.gen_range(0.1..1.0)));
    }
    for leaf in 3..n {
        let pick = rng.gen_range(0..edges.len());
        let (u, v, length) = edges.swap_remove(pick);
        let split_point: f64 = rng.gen_range(0.2..0.8);
        let midpoint = next_node;
        next_node += 1;
        edges.push((u, midpoint, length * split_point));
        edges.push((midpoint, v, length * (1.0 - split_point)));
        edges.push((midpoint, leaf, rng.gen_range(0.1..1.0)));
    }

    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); next_node];
    for &(u, v, length) in &edges {
        adjacency[u].push((v, length));
        adjacency[v].push((u, length));
    }

    // Leaf-to-leaf path lengths by depth-first search from each leaf.
    let mut flat = vec![0.0; n * n];
    for start in 0..n {
        let mut distance = vec![f64::NAN; next_node];
        let mut stack = vec![start];
        distance[start] = 0.0;
        while let Some(node) = stack.pop() {
            for &(peer, length) in &adjacency[node] {
                if distance[peer].is_nan() {
                    distance[peer] = distance[node] + length;
                    stack.push(peer);
                }
            }
        }
        for end in 0..n {
            flat[start * n + end] = distance[end];
        }
    }

    // Non-trivial splits: the leaf set on one side of each internal edge.
    let all: BTreeSet<String> = names.iter().cloned().collect();
    let mut split_set = BTreeSet::new();
    for &(u, v, _) in &edges {
        if u < n || v < n {
            continue;
        }
        let mut side = BTreeSet::new();
        let mut stack = vec![v];
        let mut seen = vec![false; next_node];
        seen[u] = true;
        seen[v] = true;
        while let Some(node) = stack.pop() {
            if node < n {
                side.insert(names[node].clone());
            }
            for &(peer, _) in &adjacency[node] {
                if !seen[peer] {
                    seen[peer] = true;
                    stack.push(peer);
                }
            }
        }
        if side.len() > 1 && side.len() < n - 1 {
            let canonical: BTreeSet<String> = if side.contains(reference) {
                all.difference(&side).cloned().collect()
            } else {
                side
            };
            split_set.insert(canonical);
        }
    }
    (flat, split_set)
}
