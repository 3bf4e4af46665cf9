//! Runtime CPU feature probe.
//!
//! The probe runs once per process and is read-only afterwards; matcher
//! selection consults it on every scan context construction.

use once_cell::sync::Lazy;

/// CPU features relevant to matcher selection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    /// 128-bit integer vectors.
    pub sse2: bool,
    /// `ptest` style vector zero tests.
    pub sse41: bool,
    /// 256-bit integer vectors.
    pub avx2: bool,
    /// 512-bit vectors.
    pub avx512f: bool,
    /// 512-bit byte-granular masked compares.
    pub avx512bw: bool,
    /// Trailing zero count and reset-lowest-bit.
    pub bmi1: bool,
}

static FEATURES: Lazy<CpuFeatures> = Lazy::new(detect);

/// Returns the memoized feature set of the current CPU.
pub fn features() -> CpuFeatures {
    *FEATURES
}

#[cfg(target_arch = "x86_64")]
fn detect() -> CpuFeatures {
    CpuFeatures {
        sse2: is_x86_feature_detected!("sse2"),
        sse41: is_x86_feature_detected!("sse4.1"),
        avx2: is_x86_feature_detected!("avx2"),
        avx512f: is_x86_feature_detected!("avx512f"),
        avx512bw: is_x86_feature_detected!("avx512bw"),
        bmi1: is_x86_feature_detected!("bmi1"),
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn detect() -> CpuFeatures {
    CpuFeatures::default()
}
