//! Error taxonomy for tree construction.
//!
//! Input validation happens once at the `build` boundary and returns a single
//! error immediately; the join kernels never surface mid-loop errors except by
//! aborting the build. Embedders receive exactly one `TreeBuildError` per
//! `build` call.

use std::fmt;

/// Errors that can occur while constructing a tree from a distance matrix.
#[derive(Debug)]
pub enum TreeBuildError {
    /// Malformed input: missing names, fewer than three taxa, distance count
    /// mismatch, or a non-finite / negative entry.
    InputShape(String),

    /// Requested algorithm name is not in the registry.
    UnknownAlgorithm(String),

    /// A merged distance became NaN, or the infinite-distance sentinel leaked
    /// into an active cell. Indices identify the join that failed.
    NumericalBreakdown {
        row: usize,
        column: usize,
        detail: String,
    },

    /// Cooperative cancellation was requested between joins.
    Cancelled,

    /// Invariant violation (row-total drift, rank underflow). A bug, reported
    /// verbatim.
    Internal(String),

    /// I/O error from the distance-file or tree-file collaborators.
    Io(std::io::Error),
}

impl fmt::Display for TreeBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeBuildError::InputShape(msg) => write!(f, "Invalid input: {}", msg),
            TreeBuildError::UnknownAlgorithm(name) => {
                write!(f, "Unknown algorithm: {}", name)
            }
            TreeBuildError::NumericalBreakdown {
                row,
                column,
                detail,
            } => {
                write!(
                    f,
                    "Non-finite distance joining rows {} and {}: {}",
                    row, column, detail
                )
            }
            TreeBuildError::Cancelled => write!(f, "Tree construction cancelled"),
            TreeBuildError::Internal(msg) => write!(f, "Internal error: {}", msg),
            TreeBuildError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for TreeBuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TreeBuildError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TreeBuildError {
    fn from(err: std::io::Error) -> Self {
        TreeBuildError::Io(err)
    }
}
