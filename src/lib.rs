//! FerrousTree - phylogenetic tree construction from pairwise distance
//! matrices.
//!
//! Given N taxon names and an N x N symmetric matrix of non-negative
//! distances, the crate builds a tree topology with branch lengths and
//! serializes it in Newick form. A registry of named algorithms covers the
//! agglomerative UPGMA / NJ / BIONJ / UNJ family (with vectorized and
//! sorted-candidate variants), an auction-ordered NJ, and the heap-driven
//! stitch-up builder with its NTCJ sibling.
//!
//! ```no_run
//! use ferrous_tree::{build, BuildOpt};
//!
//! let names: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
//! let distances = vec![
//!     0.0, 2.0, 4.0, 4.0,
//!     2.0, 0.0, 4.0, 4.0,
//!     4.0, 4.0, 0.0, 2.0,
//!     4.0, 4.0, 2.0, 0.0,
//! ];
//! let newick = build("NJ", &names, &distances, &BuildOpt::new()).unwrap();
//! println!("{}", newick);
//! ```

pub mod compute;
pub mod defaults;
pub mod engine;
pub mod errors;
pub mod matrix;
pub mod options;
pub mod registry;
pub mod tree;
pub mod utils;

use std::collections::HashSet;

pub use errors::TreeBuildError;
pub use matrix::FlatMatrix;
pub use options::{BuildOpt, CancelFlag};
pub use registry::{available_algorithms, AlgorithmInfo};

/// Returns the registered algorithms as (name, description) pairs.
pub fn list_algorithms() -> Vec<(&'static str, &'static str)> {
    available_algorithms()
        .iter()
        .map(|info| (info.name, info.description))
        .collect()
}

/// Builds a tree with the named algorithm and returns its Newick string.
///
/// Validation happens once, here: at least three uniquely named taxa, a
/// matching `names.len()^2` distance buffer, and finite non-negative entries.
/// The lower triangle is authoritative when the input is asymmetric, and
/// diagonal entries are ignored.
pub fn build(
    algorithm: &str,
    names: &[String],
    distances: &[f64],
    options: &BuildOpt,
) -> Result<String, TreeBuildError> {
    if !registry::is_registered(algorithm) {
        return Err(TreeBuildError::UnknownAlgorithm(algorithm.to_string()));
    }
    options.validate()?;
    let normalized = validate_input(names, distances)?;
    if options.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()
            .map_err(|e| TreeBuildError::Internal(format!("thread pool: {}", e)))?;
        pool.install(|| registry::dispatch(algorithm, names, &normalized, options))
    } else {
        registry::dispatch(algorithm, names, &normalized, options)
    }
}

/// Checks the input preconditions and returns the symmetrized distance
/// buffer the engines run on.
fn validate_input(names: &[String], distances: &[f64]) -> Result<Vec<f64>, TreeBuildError> {
    let n = names.len();
    if n < 3 {
        return Err(TreeBuildError::InputShape(format!(
            "at least 3 taxa are required, got {}",
            n
        )));
    }
    let mut seen = HashSet::with_capacity(n);
    for name in names {
        if name.is_empty() {
            return Err(TreeBuildError::InputShape(
                "taxon names must be non-empty".to_string(),
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(TreeBuildError::InputShape(format!(
                "duplicate taxon name {:?}",
                name
            )));
        }
    }
    if distances.len() != n * n {
        return Err(TreeBuildError::InputShape(format!(
            "expected {} distances for {} taxa, got {}",
            n * n,
            n,
            distances.len()
        )));
    }

    let mut normalized = vec![0.0; n * n];
    for row in 1..n {
        for col in 0..row {
            let v = distances[row * n + col];
            if !v.is_finite() || v < 0.0 {
                return Err(TreeBuildError::InputShape(format!(
                    "distance between {:?} and {:?} is {}",
                    names[row], names[col], v
                )));
            }
            normalized[row * n + col] = v;
            normalized[col * n + row] = v;
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn too_few_taxa_rejected() {
        let err = build("NJ", &names(&["A", "B"]), &[0.0; 4], &BuildOpt::new());
        assert!(matches!(err, Err(TreeBuildError::InputShape(_))));
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = build("NJ", &names(&["A", "B", "A"]), &[0.0; 9], &BuildOpt::new());
        assert!(matches!(err, Err(TreeBuildError::InputShape(_))));
    }

    #[test]
    fn distance_count_mismatch_rejected() {
        let err = build("NJ", &names(&["A", "B", "C"]), &[0.0; 8], &BuildOpt::new());
        assert!(matches!(err, Err(TreeBuildError::InputShape(_))));
    }

    #[test]
    fn negative_distance_rejected() {
        let mut flat = vec![0.0; 9];
        flat[3] = -1.0; // (1,0) in the lower triangle
        let err = build("NJ", &names(&["A", "B", "C"]), &flat, &BuildOpt::new());
        assert!(matches!(err, Err(TreeBuildError::InputShape(_))));
    }

    #[test]
    fn unknown_algorithm_rejected_before_validation() {
        let err = build("FASTME", &names(&["A"]), &[], &BuildOpt::new());
        assert!(matches!(err, Err(TreeBuildError::UnknownAlgorithm(_))));
    }

    #[test]
    fn lower_triangle_is_authoritative() {
        let labels = names(&["A", "B", "C"]);
        let mut flat = vec![0.0; 9];
        // Lower triangle says 0.5; upper disagrees with 0.7.
        flat[3] = 0.5;
        flat[1] = 0.7;
        flat[6] = 1.0;
        flat[2] = 1.0;
        flat[7] = 1.0;
        flat[5] = 1.0;
        let normalized = validate_input(&labels, &flat).unwrap();
        assert_eq!(normalized[1], 0.5);
        assert_eq!(normalized[3], 0.5);
    }

    #[test]
    fn nonzero_diagonal_is_ignored() {
        let labels = names(&["A", "B", "C"]);
        let mut flat = vec![
            9.0, 1.0, 1.0, //
            1.0, 9.0, 1.0, //
            1.0, 1.0, 9.0,
        ];
        flat[4] = 9.0;
        let normalized = validate_input(&labels, &flat).unwrap();
        assert_eq!(normalized[0], 0.0);
        assert_eq!(normalized[4], 0.0);
        assert_eq!(normalized[8], 0.0);
    }

    #[test]
    fn registry_listing_matches_api() {
        let listed = list_algorithms();
        assert_eq!(listed.len(), available_algorithms().len());
        assert!(listed.iter().any(|&(name, _)| name == "STITCH"));
    }
}
