// Default values and tuning constants shared across the crate.

/// Byte alignment for distance-matrix row buffers. Rows are padded out to a
/// multiple of this so the vectorized row scans can read whole blocks.
pub const MATRIX_ALIGNMENT: usize = 64;

/// Digits after the decimal point in emitted branch lengths.
pub const DEFAULT_PRECISION: usize = 6;

/// Minimum taxon-name column width in distance-matrix files.
pub const NAME_COLUMN_WIDTH: usize = 10;

/// Fraction of an edge's length assigned to the connecting "arch" between
/// the two interior nodes a stitch-up staple introduces.
pub const STAPLE_ARCH: f64 = 1.0 / 3.0;

/// Fraction assigned to each "leg" joining a staple to a caterpillar chain.
pub const STAPLE_LEG: f64 = 0.5 * (1.0 - STAPLE_ARCH);

/// Minimum rows per rayon work item in the row-scan and row-update kernels.
/// Keeps per-task overhead down on small matrices; the reduction order is
/// fixed regardless of how rows are chunked.
pub const PARALLEL_MIN_ROWS: usize = 64;

/// Relative tolerance for the internal row-total drift check.
pub const ROW_TOTAL_TOLERANCE: f64 = 1e-9;
