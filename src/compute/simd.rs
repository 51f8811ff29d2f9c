//! Runtime SIMD level detection for the row-minimum kernels.
//!
//! The join loop's inner scans process matrix rows in fixed-width blocks.
//! Which block kernel runs is decided once, at engine construction, from CPU
//! feature detection; call sites dispatch on the resulting enum rather than
//! sprinkling ISA checks through the scan code.

/// Available SIMD levels for the block row scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdLevel {
    /// Plain scalar loop; always available.
    Scalar,
    /// 128-bit NEON (aarch64 only).
    #[cfg(target_arch = "aarch64")]
    Neon,
    /// 256-bit AVX2 (x86_64 only).
    #[cfg(target_arch = "x86_64")]
    Avx2,
}

/// Detects the best SIMD level the CPU supports.
///
/// Environment variable override for testing/debugging:
/// - `FERROUS_TREE_FORCE_SCALAR=1`: skip vector kernels entirely
pub fn detect_simd_level() -> SimdLevel {
    if std::env::var("FERROUS_TREE_FORCE_SCALAR")
        .map(|v| v == "1")
        .unwrap_or(false)
    {
        log::info!("FERROUS_TREE_FORCE_SCALAR=1: using scalar row scans");
        return SimdLevel::Scalar;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return SimdLevel::Avx2;
        }
        SimdLevel::Scalar
    }

    #[cfg(target_arch = "aarch64")]
    {
        // NEON is baseline on aarch64.
        SimdLevel::Neon
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        SimdLevel::Scalar
    }
}

/// Returns a human-readable description of the SIMD level.
pub fn simd_level_description(level: SimdLevel) -> &'static str {
    match level {
        SimdLevel::Scalar => "scalar (no SIMD)",
        #[cfg(target_arch = "aarch64")]
        SimdLevel::Neon => "NEON (128-bit)",
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Avx2 => "AVX2 (256-bit)",
    }
}
