//! Build options shared by the library API and the CLI.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::defaults::DEFAULT_PRECISION;
use crate::errors::TreeBuildError;

/// Cooperative cancellation flag, polled between joins. Set it from another
/// thread to abandon a build; the engine discards partial state and returns
/// `TreeBuildError::Cancelled`.
pub type CancelFlag = Arc<AtomicBool>;

/// Options accepted by [`build`](crate::build).
///
/// `threads == 0` uses the rayon default pool; any other value runs the build
/// inside a dedicated pool of that size. Results are identical either way.
#[derive(Debug, Clone)]
pub struct BuildOpt {
    /// Digits after the decimal point in emitted branch lengths (>= 1).
    pub precision: usize,
    /// Worker threads for the row-scan and row-update kernels (0 = default).
    pub threads: usize,
    /// Verbosity level: 1=error, 2=warning, 3=message, 4+=debugging.
    pub verbosity: i32,
    /// Gzip-compress tree files written by the file collaborator.
    pub zipped_output: bool,
    /// Join down to two clusters and emit a 2-way root instead of the
    /// unrooted 3-way terminal link.
    pub rooted: bool,
    /// Emit the root's children without the enclosing parentheses or the
    /// trailing `;` (for splicing into a larger tree).
    pub subtree_only: bool,
    /// Optional cancellation token, polled between joins.
    pub cancel: Option<CancelFlag>,
}

impl Default for BuildOpt {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildOpt {
    pub fn new() -> Self {
        BuildOpt {
            precision: DEFAULT_PRECISION,
            threads: 0,
            verbosity: 3,
            zipped_output: false,
            rooted: false,
            subtree_only: false,
            cancel: None,
        }
    }

    pub fn validate(&self) -> Result<(), TreeBuildError> {
        if self.precision < 1 {
            return Err(TreeBuildError::InputShape(format!(
                "precision must be at least 1, got {}",
                self.precision
            )));
        }
        Ok(())
    }

    /// True if the cancellation token has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(std::sync::atomic::Ordering::Relaxed))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_precision_is_valid() {
        assert!(BuildOpt::new().validate().is_ok());
    }

    #[test]
    fn zero_precision_rejected() {
        let mut opt = BuildOpt::new();
        opt.precision = 0;
        assert!(opt.validate().is_err());
    }
}
