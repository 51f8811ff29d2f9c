//! Append-only cluster forest.
//!
//! Leaves are added first, in input order, one per taxon. Each join appends an
//! interior cluster linked to two earlier clusters with branch lengths; the
//! final cluster carries a 3-way link (unrooted) or a 2-way link (rooted).
//! The forest is a DAG built bottom-up, held in an arena indexed by integer
//! ids, and read only by the Newick emitter once construction finishes.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::TreeBuildError;

#[derive(Debug, Clone, Copy)]
pub struct ClusterLink {
    pub child: usize,
    pub length: f64,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    /// Taxon name for leaf clusters; interior clusters are unnamed.
    pub name: Option<String>,
    /// Number of leaves under this cluster.
    pub leaf_count: usize,
    pub links: Vec<ClusterLink>,
}

#[derive(Debug, Default)]
pub struct ClusterForest {
    clusters: Vec<Cluster>,
}

impl ClusterForest {
    pub fn new() -> Self {
        ClusterForest {
            clusters: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.clusters.clear();
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn cluster(&self, id: usize) -> &Cluster {
        &self.clusters[id]
    }

    pub fn leaf_count(&self, id: usize) -> usize {
        self.clusters[id].leaf_count
    }

    pub fn add_leaf(&mut self, name: &str) -> usize {
        self.clusters.push(Cluster {
            name: Some(name.to_string()),
            leaf_count: 1,
            links: Vec::new(),
        });
        self.clusters.len() - 1
    }

    pub fn join(&mut self, a: usize, length_a: f64, b: usize, length_b: f64) -> usize {
        let leaf_count = self.clusters[a].leaf_count + self.clusters[b].leaf_count;
        self.clusters.push(Cluster {
            name: None,
            leaf_count,
            links: vec![
                ClusterLink {
                    child: a,
                    length: length_a,
                },
                ClusterLink {
                    child: b,
                    length: length_b,
                },
            ],
        });
        self.clusters.len() - 1
    }

    /// Terminal 3-way link for unrooted trees.
    #[allow(clippy::too_many_arguments)]
    pub fn join_three(
        &mut self,
        a: usize,
        length_a: f64,
        b: usize,
        length_b: f64,
        c: usize,
        length_c: f64,
    ) -> usize {
        let leaf_count = self.clusters[a].leaf_count
            + self.clusters[b].leaf_count
            + self.clusters[c].leaf_count;
        self.clusters.push(Cluster {
            name: None,
            leaf_count,
            links: vec![
                ClusterLink {
                    child: a,
                    length: length_a,
                },
                ClusterLink {
                    child: b,
                    length: length_b,
                },
                ClusterLink {
                    child: c,
                    length: length_c,
                },
            ],
        });
        self.clusters.len() - 1
    }

    /// Serializes the forest from its last-added cluster as a Newick string.
    pub fn write_newick(&self, precision: usize, subtree_only: bool) -> String {
        let mut out = String::new();
        if self.clusters.is_empty() {
            return out;
        }
        let root = self.clusters.len() - 1;
        if subtree_only {
            self.write_children(root, precision, &mut out);
        } else {
            self.write_cluster(root, precision, &mut out);
            out.push(';');
        }
        out
    }

    /// Writes the Newick text to a file, gzip-compressed when asked.
    pub fn write_newick_file(
        &self,
        path: &Path,
        precision: usize,
        zipped: bool,
        subtree_only: bool,
    ) -> Result<(), TreeBuildError> {
        let newick = self.write_newick(precision, subtree_only);
        let file = File::create(path)?;
        let mut out: Box<dyn Write> = if zipped {
            Box::new(GzEncoder::new(BufWriter::new(file), Compression::default()))
        } else {
            Box::new(BufWriter::new(file))
        };
        writeln!(out, "{}", newick)?;
        out.flush()?;
        Ok(())
    }

    fn write_cluster(&self, id: usize, precision: usize, out: &mut String) {
        let cluster = &self.clusters[id];
        match &cluster.name {
            Some(name) => out.push_str(name),
            None => {
                out.push('(');
                self.write_children(id, precision, out);
                out.push(')');
            }
        }
    }

    fn write_children(&self, id: usize, precision: usize, out: &mut String) {
        let mut sep = "";
        for link in &self.clusters[id].links {
            out.push_str(sep);
            sep = ",";
            self.write_cluster(link.child, precision, out);
            out.push(':');
            format_length(link.length, precision, out);
        }
    }
}

/// Branch lengths print in fixed decimal notation; zero and negative lengths
/// print as a bare `0`.
pub(crate) fn format_length(length: f64, precision: usize, out: &mut String) {
    use std::fmt::Write as _;
    if length <= 0.0 {
        out.push('0');
    } else {
        let _ = write!(out, "{:.*}", precision, length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_pair_forest() -> ClusterForest {
        let mut forest = ClusterForest::new();
        let a = forest.add_leaf("A");
        let b = forest.add_leaf("B");
        let c = forest.add_leaf("C");
        let d = forest.add_leaf("D");
        let ab = forest.join(a, 1.0, b, 1.0);
        let cd = forest.join(c, 1.0, d, 1.0);
        forest.join(ab, 2.0, cd, 2.0);
        forest
    }

    #[test]
    fn newick_nests_and_terminates() {
        let forest = two_pair_forest();
        assert_eq!(
            forest.write_newick(2, false),
            "((A:1.00,B:1.00):2.00,(C:1.00,D:1.00):2.00);"
        );
    }

    #[test]
    fn three_way_terminal_link() {
        let mut forest = ClusterForest::new();
        let a = forest.add_leaf("A");
        let b = forest.add_leaf("B");
        let c = forest.add_leaf("C");
        forest.join_three(a, 0.5, b, 0.5, c, 0.5);
        assert_eq!(forest.write_newick(1, false), "(A:0.5,B:0.5,C:0.5);");
        assert_eq!(forest.leaf_count(3), 3);
    }

    #[test]
    fn zero_and_negative_lengths_emit_bare_zero() {
        let mut forest = ClusterForest::new();
        let a = forest.add_leaf("A");
        let b = forest.add_leaf("B");
        let c = forest.add_leaf("C");
        forest.join_three(a, 0.0, b, -1e-12, c, 0.25);
        assert_eq!(forest.write_newick(2, false), "(A:0,B:0,C:0.25);");
    }

    #[test]
    fn subtree_only_drops_wrapper() {
        let forest = two_pair_forest();
        assert_eq!(
            forest.write_newick(2, true),
            "(A:1.00,B:1.00):2.00,(C:1.00,D:1.00):2.00"
        );
    }

    #[test]
    fn leaf_counts_accumulate() {
        let forest = two_pair_forest();
        assert_eq!(forest.leaf_count(4), 2);
        assert_eq!(forest.leaf_count(6), 4);
    }
}
