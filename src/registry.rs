//! The algorithm registry.
//!
//! Maps the documented algorithm names to builder constructors. The `-V`
//! variants run the block-SIMD row scans (falling back to scalar when the CPU
//! offers nothing better), the `-R` variants the sorted-candidate search.

use crate::compute::simd::detect_simd_level;
use crate::engine::criteria::{
    BionjCriterion, JoinCriterion, NjCriterion, UnjCriterion, UpgmaCriterion,
};
use crate::engine::{ntcj, stitchup, JoinEngine, SearchStrategy};
use crate::errors::TreeBuildError;
use crate::options::BuildOpt;

/// A registered algorithm: its lookup name and a short description.
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmInfo {
    pub name: &'static str,
    pub description: &'static str,
}

const ALGORITHMS: &[AlgorithmInfo] = &[
    AlgorithmInfo {
        name: "UPGMA",
        description: "UPGMA (Sokal, Michener 1958)",
    },
    AlgorithmInfo {
        name: "UPGMA-V",
        description: "Vectorized UPGMA",
    },
    AlgorithmInfo {
        name: "NJ",
        description: "Neighbor Joining (Saitou, Nei 1987)",
    },
    AlgorithmInfo {
        name: "NJ-V",
        description: "Vectorized Neighbor Joining",
    },
    AlgorithmInfo {
        name: "NJ-R",
        description: "Neighbor Joining with sorted-candidate pruning (RapidNJ)",
    },
    AlgorithmInfo {
        name: "BIONJ",
        description: "BIONJ (Gascuel 1997)",
    },
    AlgorithmInfo {
        name: "BIONJ-V",
        description: "Vectorized BIONJ",
    },
    AlgorithmInfo {
        name: "BIONJ-R",
        description: "BIONJ with sorted-candidate pruning",
    },
    AlgorithmInfo {
        name: "UNJ",
        description: "Unweighted Neighbor Joining (Gascuel 1997)",
    },
    AlgorithmInfo {
        name: "AUCTION",
        description: "Neighbor Joining with auction-ordered row scans",
    },
    AlgorithmInfo {
        name: "STITCH",
        description: "Family Stitch-up (lowest cost)",
    },
    AlgorithmInfo {
        name: "NTCJ",
        description: "Cluster joining by nearest (NJ) taxon distance",
    },
];

/// All registered algorithms, in registration order.
pub fn available_algorithms() -> &'static [AlgorithmInfo] {
    ALGORITHMS
}

/// True when `name` is registered.
pub fn is_registered(name: &str) -> bool {
    ALGORITHMS.iter().any(|info| info.name == name)
}

fn run_agglomerative<C: JoinCriterion<f64>>(
    criterion: C,
    search: SearchStrategy,
    names: &[String],
    flat: &[f64],
    opt: &BuildOpt,
) -> Result<String, TreeBuildError> {
    log::debug!(
        "Constructing tree over {} taxa ({:?} search)",
        names.len(),
        search
    );
    let mut engine = JoinEngine::new(criterion, search, opt.rooted);
    engine.load(names, flat);
    engine.construct_tree(opt.cancel.as_ref())?;
    Ok(engine
        .forest()
        .write_newick(opt.precision, opt.subtree_only))
}

/// Dispatches a validated build to the named algorithm.
pub(crate) fn dispatch(
    algorithm: &str,
    names: &[String],
    flat: &[f64],
    opt: &BuildOpt,
) -> Result<String, TreeBuildError> {
    let vector = || SearchStrategy::Vectorized(detect_simd_level());
    match algorithm {
        "UPGMA" => run_agglomerative(UpgmaCriterion::new(), SearchStrategy::Scalar, names, flat, opt),
        "UPGMA-V" => run_agglomerative(UpgmaCriterion::new(), vector(), names, flat, opt),
        "NJ" => run_agglomerative(NjCriterion::new(), SearchStrategy::Scalar, names, flat, opt),
        "NJ-V" => run_agglomerative(NjCriterion::new(), vector(), names, flat, opt),
        "NJ-R" => run_agglomerative(NjCriterion::new(), SearchStrategy::Sorted, names, flat, opt),
        "BIONJ" => run_agglomerative(
            BionjCriterion::new(),
            SearchStrategy::Scalar,
            names,
            flat,
            opt,
        ),
        "BIONJ-V" => run_agglomerative(BionjCriterion::new(), vector(), names, flat, opt),
        "BIONJ-R" => run_agglomerative(
            BionjCriterion::new(),
            SearchStrategy::Sorted,
            names,
            flat,
            opt,
        ),
        "UNJ" => run_agglomerative(UnjCriterion::new(), SearchStrategy::Scalar, names, flat, opt),
        "AUCTION" => run_agglomerative(
            NjCriterion::new(),
            SearchStrategy::Auction,
            names,
            flat,
            opt,
        ),
        "STITCH" => stitchup::build_stitchup_tree(names, flat, opt),
        "NTCJ" => ntcj::build_ntcj_tree(names, flat, opt),
        other => Err(TreeBuildError::UnknownAlgorithm(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twelve_algorithms_are_registered() {
        assert_eq!(available_algorithms().len(), 12);
        for info in available_algorithms() {
            assert!(!info.description.is_empty());
        }
    }

    #[test]
    fn lookup_is_exact() {
        assert!(is_registered("BIONJ-R"));
        assert!(!is_registered("bionj-r"));
        assert!(!is_registered("FASTME"));
    }
}
