//! The 256-bit matcher, preferred on most modern x86.

use core::arch::x86_64::*;

use crate::signature::SignatureElement;

use super::{segment, single, x16_lane_mask, ScanAlignment, ScanContext};

const WIDTH: usize = 32;

/// Loads the signature's value and mask bytes into a vector pair. Lanes
/// past the end of the signature behave as wildcards.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load_signature(signature: &[SignatureElement]) -> (__m256i, __m256i) {
    let mut values = [0u8; WIDTH];
    let mut masks = [0u8; WIDTH];
    for (i, element) in signature.iter().enumerate() {
        values[i] = element.value();
        masks[i] = element.mask();
    }
    (
        _mm256_loadu_si256(values.as_ptr().cast()),
        _mm256_loadu_si256(masks.as_ptr().cast()),
    )
}

/// # Safety
///
/// AVX2 and BMI1 must be available.
#[target_feature(enable = "avx2", enable = "bmi1")]
pub(crate) unsafe fn find(haystack: &[u8], context: &ScanContext<'_>) -> Option<usize> {
    let signature = context.signature();
    let n = signature.len();
    let pivot = context.pivot().unwrap_or(0);

    let Some(seg) = segment(haystack, WIDTH, n, pivot) else {
        return single::find(haystack, 0, haystack.len(), context);
    };

    if seg.pre_end > 0 {
        if let Some(found) = single::find(haystack, 0, seg.pre_end, context) {
            return Some(found);
        }
    }

    let first = _mm256_set1_epi8(signature[pivot].value() as i8);
    let second = match context.pivot() {
        Some(p) => Some(_mm256_set1_epi8(signature[p + 1].value() as i8)),
        None => None,
    };
    let veccmp = n <= WIDTH;
    let (values, masks) = if veccmp {
        load_signature(signature)
    } else {
        (_mm256_setzero_si256(), _mm256_setzero_si256())
    };
    let lane_mask = match context.alignment() {
        ScanAlignment::X16 => x16_lane_mask(seg.vec_off, WIDTH) as u32,
        ScanAlignment::X1 => 0,
    };

    for block_index in 0..seg.vec_count {
        let offset = seg.vec_off + block_index * WIDTH;
        let block = _mm256_load_si256(haystack.as_ptr().add(offset).cast());
        let mut mask = _mm256_movemask_epi8(_mm256_cmpeq_epi8(first, block)) as u32;

        if context.alignment() == ScanAlignment::X16 {
            mask &= lane_mask;
        } else if let Some(second) = second {
            let mask2 = _mm256_movemask_epi8(_mm256_cmpeq_epi8(second, block)) as u32;
            // A probe hit in the top lane may pair with the first byte of
            // the next block; let it through and verify rather than loading
            // past the vector.
            mask &= (mask2 >> 1) | 1 << (WIDTH - 1);
        }

        while mask != 0 {
            let lane = mask.trailing_zeros() as usize;
            let candidate = offset + lane - pivot;
            if veccmp {
                let data = _mm256_loadu_si256(haystack.as_ptr().add(candidate).cast());
                let diff = _mm256_xor_si256(_mm256_and_si256(data, masks), values);
                if _mm256_testz_si256(diff, diff) != 0 {
                    return Some(candidate);
                }
            } else if single::matches_at(haystack, candidate, signature) {
                return Some(candidate);
            }
            mask &= mask - 1;
        }
    }

    single::find(haystack, seg.post_start, haystack.len(), context)
}
