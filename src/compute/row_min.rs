//! Row-minimum search kernels.
//!
//! Each agglomerative step scans, for every row `r`, the columns `0..r` of the
//! distance matrix for the cheapest join candidate. The NJ-family criteria
//! subtract a per-column adjustment (the scaled row totals) during the scan;
//! UPGMA scans the raw cells. Both shapes are provided in a scalar path and a
//! block-parallel SIMD path.
//!
//! The SIMD path carries `(value, column)` pairs through the lanes: values
//! come from the matrix row, columns from a prefilled `0.0, 1.0, 2.0, ...`
//! scratch stream loaded in lock-step. Lane-wise blending keeps the earlier
//! (lower-column) candidate on exact ties, and the lane-extraction step
//! prefers the smaller column as well, so the vectorized kernels select the
//! same cell as the scalar loop, ties included. Tail columns that do not fill
//! a block are handled scalarly.

use crate::compute::scalar::NjFloat;
use crate::compute::simd::SimdLevel;

/// Result of scanning one row: the minimum (possibly adjusted) value and the
/// column it was found in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowMinimum<T> {
    pub value: T,
    pub column: usize,
}

/// Scans `row[0..limit]`, subtracting `adjust` when supplied. Ties resolve to
/// the smaller column.
pub fn row_minimum<T: NjFloat>(
    level: SimdLevel,
    row: &[T],
    adjust: Option<&[T]>,
    column_numbers: &[T],
    limit: usize,
) -> RowMinimum<T> {
    let (value, column) = match level {
        SimdLevel::Scalar => scalar_row_minimum(row, adjust, limit),
        #[allow(unreachable_patterns)]
        _ => T::vector_row_minimum(level, row, adjust, column_numbers, limit),
    };
    RowMinimum { value, column }
}

pub(crate) fn scalar_row_minimum<T: NjFloat>(
    row: &[T],
    adjust: Option<&[T]>,
    limit: usize,
) -> (T, usize) {
    let mut best = T::INFINITE_DISTANCE;
    let mut best_column = 0usize;
    match adjust {
        None => {
            for (col, &v) in row[..limit].iter().enumerate() {
                if v < best {
                    best = v;
                    best_column = col;
                }
            }
        }
        Some(adj) => {
            for col in 0..limit {
                let v = row[col] - adj[col];
                if v < best {
                    best = v;
                    best_column = col;
                }
            }
        }
    }
    (best, best_column)
}

pub(crate) fn vector_row_minimum_f64(
    level: SimdLevel,
    row: &[f64],
    adjust: Option<&[f64]>,
    column_numbers: &[f64],
    limit: usize,
) -> (f64, usize) {
    match level {
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Avx2 => unsafe { avx2_row_minimum_f64(row, adjust, column_numbers, limit) },
        #[cfg(target_arch = "aarch64")]
        SimdLevel::Neon => neon_row_minimum_f64(row, adjust, column_numbers, limit),
        _ => scalar_row_minimum(row, adjust, limit),
    }
}

pub(crate) fn vector_row_minimum_f32(
    level: SimdLevel,
    row: &[f32],
    adjust: Option<&[f32]>,
    column_numbers: &[f32],
    limit: usize,
) -> (f32, usize) {
    match level {
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Avx2 => unsafe { avx2_row_minimum_f32(row, adjust, column_numbers, limit) },
        #[cfg(target_arch = "aarch64")]
        SimdLevel::Neon => neon_row_minimum_f32(row, adjust, column_numbers, limit),
        _ => scalar_row_minimum(row, adjust, limit),
    }
}

/// Folds the lane-wise minima down to a single `(value, column)`, preferring
/// the smaller column on ties, then finishes the scalar tail.
fn combine_lanes_and_tail<T: NjFloat>(
    values: &[T],
    columns: &[T],
    row: &[T],
    adjust: Option<&[T]>,
    tail_start: usize,
    limit: usize,
) -> (T, usize) {
    let mut best = T::INFINITE_DISTANCE;
    let mut best_column = usize::MAX;
    for lane in 0..values.len() {
        let column = columns[lane].to_f64() as usize;
        if values[lane] < best || (values[lane] == best && column < best_column) {
            best = values[lane];
            best_column = column;
        }
    }
    for col in tail_start..limit {
        let v = match adjust {
            None => row[col],
            Some(adj) => row[col] - adj[col],
        };
        if v < best {
            best = v;
            best_column = col;
        }
    }
    if best_column == usize::MAX {
        best_column = 0;
    }
    (best, best_column)
}

// ============================================================================
// AVX2 kernels (x86_64)
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn avx2_row_minimum_f64(
    row: &[f64],
    adjust: Option<&[f64]>,
    column_numbers: &[f64],
    limit: usize,
) -> (f64, usize) {
    use std::arch::x86_64::*;

    const BLOCK: usize = 4;
    let mut min_v = _mm256_set1_pd(f64::INFINITE_DISTANCE);
    let mut col_v = _mm256_set1_pd(0.0);
    let mut col = 0usize;
    match adjust {
        None => {
            while col + BLOCK <= limit {
                let v = _mm256_loadu_pd(row.as_ptr().add(col));
                let n = _mm256_loadu_pd(column_numbers.as_ptr().add(col));
                let less = _mm256_cmp_pd::<_CMP_LT_OQ>(v, min_v);
                col_v = _mm256_blendv_pd(col_v, n, less);
                min_v = _mm256_blendv_pd(min_v, v, less);
                col += BLOCK;
            }
        }
        Some(adj) => {
            while col + BLOCK <= limit {
                let raw = _mm256_loadu_pd(row.as_ptr().add(col));
                let sub = _mm256_loadu_pd(adj.as_ptr().add(col));
                let v = _mm256_sub_pd(raw, sub);
                let n = _mm256_loadu_pd(column_numbers.as_ptr().add(col));
                let less = _mm256_cmp_pd::<_CMP_LT_OQ>(v, min_v);
                col_v = _mm256_blendv_pd(col_v, n, less);
                min_v = _mm256_blendv_pd(min_v, v, less);
                col += BLOCK;
            }
        }
    }
    let mut values = [f64::INFINITE_DISTANCE; BLOCK];
    let mut columns = [0.0f64; BLOCK];
    _mm256_storeu_pd(values.as_mut_ptr(), min_v);
    _mm256_storeu_pd(columns.as_mut_ptr(), col_v);
    combine_lanes_and_tail(&values, &columns, row, adjust, col, limit)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn avx2_row_minimum_f32(
    row: &[f32],
    adjust: Option<&[f32]>,
    column_numbers: &[f32],
    limit: usize,
) -> (f32, usize) {
    use std::arch::x86_64::*;

    const BLOCK: usize = 8;
    let mut min_v = _mm256_set1_ps(f32::INFINITE_DISTANCE);
    let mut col_v = _mm256_set1_ps(0.0);
    let mut col = 0usize;
    match adjust {
        None => {
            while col + BLOCK <= limit {
                let v = _mm256_loadu_ps(row.as_ptr().add(col));
                let n = _mm256_loadu_ps(column_numbers.as_ptr().add(col));
                let less = _mm256_cmp_ps::<_CMP_LT_OQ>(v, min_v);
                col_v = _mm256_blendv_ps(col_v, n, less);
                min_v = _mm256_blendv_ps(min_v, v, less);
                col += BLOCK;
            }
        }
        Some(adj) => {
            while col + BLOCK <= limit {
                let raw = _mm256_loadu_ps(row.as_ptr().add(col));
                let sub = _mm256_loadu_ps(adj.as_ptr().add(col));
                let v = _mm256_sub_ps(raw, sub);
                let n = _mm256_loadu_ps(column_numbers.as_ptr().add(col));
                let less = _mm256_cmp_ps::<_CMP_LT_OQ>(v, min_v);
                col_v = _mm256_blendv_ps(col_v, n, less);
                min_v = _mm256_blendv_ps(min_v, v, less);
                col += BLOCK;
            }
        }
    }
    let mut values = [f32::INFINITE_DISTANCE; BLOCK];
    let mut columns = [0.0f32; BLOCK];
    _mm256_storeu_ps(values.as_mut_ptr(), min_v);
    _mm256_storeu_ps(columns.as_mut_ptr(), col_v);
    combine_lanes_and_tail(&values, &columns, row, adjust, col, limit)
}

// ============================================================================
// NEON kernels (aarch64)
// ============================================================================

#[cfg(target_arch = "aarch64")]
fn neon_row_minimum_f64(
    row: &[f64],
    adjust: Option<&[f64]>,
    column_numbers: &[f64],
    limit: usize,
) -> (f64, usize) {
    use std::arch::aarch64::*;

    const BLOCK: usize = 2;
    unsafe {
        let mut min_v = vdupq_n_f64(f64::INFINITE_DISTANCE);
        let mut col_v = vdupq_n_f64(0.0);
        let mut col = 0usize;
        while col + BLOCK <= limit {
            let mut v = vld1q_f64(row.as_ptr().add(col));
            if let Some(adj) = adjust {
                v = vsubq_f64(v, vld1q_f64(adj.as_ptr().add(col)));
            }
            let n = vld1q_f64(column_numbers.as_ptr().add(col));
            let less = vcltq_f64(v, min_v);
            col_v = vbslq_f64(less, n, col_v);
            min_v = vbslq_f64(less, v, min_v);
            col += BLOCK;
        }
        let values = [vgetq_lane_f64::<0>(min_v), vgetq_lane_f64::<1>(min_v)];
        let columns = [vgetq_lane_f64::<0>(col_v), vgetq_lane_f64::<1>(col_v)];
        combine_lanes_and_tail(&values, &columns, row, adjust, col, limit)
    }
}

#[cfg(target_arch = "aarch64")]
fn neon_row_minimum_f32(
    row: &[f32],
    adjust: Option<&[f32]>,
    column_numbers: &[f32],
    limit: usize,
) -> (f32, usize) {
    use std::arch::aarch64::*;

    const BLOCK: usize = 4;
    unsafe {
        let mut min_v = vdupq_n_f32(f32::INFINITE_DISTANCE);
        let mut col_v = vdupq_n_f32(0.0);
        let mut col = 0usize;
        while col + BLOCK <= limit {
            let mut v = vld1q_f32(row.as_ptr().add(col));
            if let Some(adj) = adjust {
                v = vsubq_f32(v, vld1q_f32(adj.as_ptr().add(col)));
            }
            let n = vld1q_f32(column_numbers.as_ptr().add(col));
            let less = vcltq_f32(v, min_v);
            col_v = vbslq_f32(less, n, col_v);
            min_v = vbslq_f32(less, v, min_v);
            col += BLOCK;
        }
        let values = [
            vgetq_lane_f32::<0>(min_v),
            vgetq_lane_f32::<1>(min_v),
            vgetq_lane_f32::<2>(min_v),
            vgetq_lane_f32::<3>(min_v),
        ];
        let columns = [
            vgetq_lane_f32::<0>(col_v),
            vgetq_lane_f32::<1>(col_v),
            vgetq_lane_f32::<2>(col_v),
            vgetq_lane_f32::<3>(col_v),
        ];
        combine_lanes_and_tail(&values, &columns, row, adjust, col, limit)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::simd::detect_simd_level;

    fn column_stream(n: usize) -> Vec<f64> {
        (0..n).map(|c| c as f64).collect()
    }

    #[test]
    fn scalar_finds_minimum_and_breaks_ties_low() {
        let row = [5.0, 2.0, 9.0, 2.0, 7.0];
        let (value, column) = scalar_row_minimum(&row, None, row.len());
        assert_eq!(value, 2.0);
        assert_eq!(column, 1);
    }

    #[test]
    fn scalar_applies_adjustment() {
        let row = [5.0, 2.0, 9.0];
        let adj = [5.0, 0.0, 0.0];
        let (value, column) = scalar_row_minimum(&row, Some(&adj), 3);
        assert_eq!(value, 0.0);
        assert_eq!(column, 0);
    }

    #[test]
    fn vector_matches_scalar_on_awkward_lengths() {
        let level = detect_simd_level();
        for limit in [1usize, 2, 3, 4, 5, 7, 8, 9, 15, 16, 17, 31, 33] {
            let row: Vec<f64> = (0..limit)
                .map(|c| ((c * 7919 + 13) % 101) as f64 / 10.0)
                .collect();
            let cols = column_stream(limit);
            let scalar = scalar_row_minimum(&row, None, limit);
            let vector = vector_row_minimum_f64(level, &row, None, &cols, limit);
            assert_eq!(scalar, vector, "limit {}", limit);
        }
    }

    #[test]
    fn vector_matches_scalar_on_ties() {
        let level = detect_simd_level();
        // All equal: both paths must pick column 0.
        let row = vec![3.5f64; 23];
        let cols = column_stream(row.len());
        let scalar = scalar_row_minimum(&row, None, row.len());
        let vector = vector_row_minimum_f64(level, &row, None, &cols, row.len());
        assert_eq!(scalar, vector);
        assert_eq!(scalar.1, 0);

        // Duplicate minimum straddling a block boundary.
        let mut row = vec![9.0f64; 23];
        row[6] = 1.0;
        row[17] = 1.0;
        let vector = vector_row_minimum_f64(level, &row, None, &cols, row.len());
        assert_eq!(vector, (1.0, 6));
    }

    #[test]
    fn vector_matches_scalar_with_adjustment_f32() {
        let level = detect_simd_level();
        let limit = 29usize;
        let row: Vec<f32> = (0..limit).map(|c| ((c * 31 + 7) % 17) as f32).collect();
        let adj: Vec<f32> = (0..limit).map(|c| ((c * 13) % 11) as f32 / 2.0).collect();
        let cols: Vec<f32> = (0..limit).map(|c| c as f32).collect();
        let scalar = scalar_row_minimum(&row, Some(&adj), limit);
        let vector = vector_row_minimum_f32(level, &row, Some(&adj), &cols, limit);
        assert_eq!(scalar, vector);
    }

    #[test]
    fn empty_scan_returns_sentinel() {
        let row: [f64; 0] = [];
        let (value, _) = scalar_row_minimum(&row, None, 0);
        assert_eq!(value, f64::INFINITE_DISTANCE);
    }
}
