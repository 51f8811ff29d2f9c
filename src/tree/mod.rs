//! The append-only cluster forest and its Newick serialization.

pub mod forest;

pub use forest::{Cluster, ClusterForest, ClusterLink};
