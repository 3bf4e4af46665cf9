//! The scan engine: planning, dispatch and the front-end entry points.
//!
//! A scan is a pipeline: the planner strips leading wildcards, picks the
//! widest matcher the current CPU supports and, for byte-granular scans,
//! picks a *pivot* pair of adjacent fully specified elements to use as the
//! SIMD prefilter. The matcher then runs over the range, handing the
//! unaligned head and tail to the scalar reference implementation.

use crate::result::{ScanResult, ScanResultMut};
use crate::signature::SignatureElement;
use crate::system;

mod frequency;
pub(crate) mod single;

#[cfg(target_arch = "x86_64")]
mod avx2;
#[cfg(target_arch = "x86_64")]
mod avx512;
#[cfg(target_arch = "x86_64")]
mod sse;

/// The spacing of candidate offsets to test.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScanAlignment {
    /// Every byte offset is a candidate.
    #[default]
    X1,
    /// Only offsets at 16-byte boundaries from the start of the scanned
    /// range are candidates.
    X16,
}

impl ScanAlignment {
    /// The distance between consecutive candidate offsets.
    #[inline]
    pub(crate) const fn stride(self) -> usize {
        match self {
            Self::X1 => 1,
            Self::X16 => 16,
        }
    }
}

bitflags::bitflags! {
    /// Caller-supplied hints that influence pivot selection. Hints never
    /// change the result set, only how fast it is produced.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ScanHints: u32 {
        /// The scanned data is x86-64 machine code; bias pivot selection
        /// toward byte pairs that are rare in such code.
        const X86_64 = 1 << 0;
        /// Only use pair probing when the first two elements are both fully
        /// specified, i.e. the caller guarantees the leading pair is
        /// distinctive.
        const PAIR0 = 1 << 1;
    }
}

/// The matcher implementation selected for a scan, chosen once per context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ScanMode {
    Single,
    #[cfg(target_arch = "x86_64")]
    Sse,
    #[cfg(target_arch = "x86_64")]
    Avx2,
    #[cfg(target_arch = "x86_64")]
    Avx512,
}

impl ScanMode {
    /// The matcher's vector width in bytes; 0 for the scalar matcher.
    pub(crate) const fn vector_width(self) -> usize {
        match self {
            Self::Single => 0,
            #[cfg(target_arch = "x86_64")]
            Self::Sse => 16,
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 => 32,
            #[cfg(target_arch = "x86_64")]
            Self::Avx512 => 64,
        }
    }
}

fn select_mode(features: system::CpuFeatures) -> ScanMode {
    #[cfg(target_arch = "x86_64")]
    {
        if features.avx512f && features.avx512bw && features.bmi1 {
            return ScanMode::Avx512;
        }
        if features.avx2 && features.bmi1 {
            return ScanMode::Avx2;
        }
        if features.sse2 && features.sse41 {
            return ScanMode::Sse;
        }
    }
    let _ = features;
    ScanMode::Single
}

/// Picks the pivot pair index for an X1 scan, if any.
///
/// With the `X86_64` hint (and without `PAIR0`) every adjacent fully
/// specified pair with an index below the vector width is scored against
/// the byte-pair frequency table and the rarest wins. Otherwise the first
/// fully specified adjacent pair anywhere in the pattern is used; `PAIR0`
/// restricts that to the leading pair.
fn select_pivot(
    signature: &[SignatureElement],
    width: usize,
    alignment: ScanAlignment,
    hints: ScanHints,
) -> Option<usize> {
    if alignment != ScanAlignment::X1 || width == 0 || signature.len() < 2 {
        return None;
    }

    if hints.contains(ScanHints::X86_64) && !hints.contains(ScanHints::PAIR0) {
        let mut best: Option<(usize, isize)> = None;
        for i in 0..(signature.len() - 1).min(width) {
            let (a, b) = (signature[i], signature[i + 1]);
            if !a.is_exact() || !b.is_exact() {
                continue;
            }
            // A pair absent from the table is treated as common.
            let rank = frequency::rank(a.value(), b.value()).map_or(-1, |r| r as isize);
            if best.map_or(true, |(_, best_rank)| rank > best_rank) {
                best = Some((i, rank));
            }
        }
        if let Some((i, _)) = best {
            return Some(i);
        }
    }

    let first_pair = signature
        .windows(2)
        .position(|pair| pair[0].is_exact() && pair[1].is_exact())?;
    if first_pair != 0 && hints.contains(ScanHints::PAIR0) {
        return None;
    }
    Some(first_pair)
}

/// An immutable scan plan: the effective signature (leading wildcards
/// stripped), the alignment, the hints, the matcher chosen for this CPU and
/// the probe pivot.
///
/// Construct once and reuse when scanning many ranges for the same pattern.
#[derive(Copy, Clone, Debug)]
pub struct ScanContext<'sig> {
    signature: &'sig [SignatureElement],
    leading: usize,
    alignment: ScanAlignment,
    hints: ScanHints,
    pivot: Option<usize>,
    mode: ScanMode,
}

impl<'sig> ScanContext<'sig> {
    /// Plans a scan for the given signature.
    pub fn new(
        signature: &'sig [SignatureElement],
        alignment: ScanAlignment,
        hints: ScanHints,
    ) -> Self {
        let leading = signature
            .iter()
            .take_while(|element| element.is_wildcard())
            .count();
        let effective = &signature[leading..];

        let mut mode = select_mode(system::features());
        let pivot = select_pivot(effective, mode.vector_width(), alignment, hints);
        if pivot.is_none() && !matches!(effective.first(), Some(element) if element.is_exact()) {
            // A broadcast equality probe on a partially masked byte would
            // miss matches, so such patterns stay on the scalar matcher.
            mode = ScanMode::Single;
        }
        log::trace!(
            "planned scan: {} elements ({} leading wildcards), matcher {:?}, pivot {:?}",
            effective.len(),
            leading,
            mode,
            pivot
        );

        Self {
            signature: effective,
            leading,
            alignment,
            hints,
            pivot,
            mode,
        }
    }

    /// The signature with leading wildcards stripped.
    #[inline]
    pub fn signature(&self) -> &'sig [SignatureElement] {
        self.signature
    }

    /// The candidate alignment.
    #[inline]
    pub fn alignment(&self) -> ScanAlignment {
        self.alignment
    }

    /// The hints the plan was built with.
    #[inline]
    pub fn hints(&self) -> ScanHints {
        self.hints
    }

    /// The selected pivot pair index, if any.
    #[inline]
    pub fn pivot(&self) -> Option<usize> {
        self.pivot
    }

    /// Returns the offset of the first match in `data`, or `None`.
    pub fn find(&self, data: &[u8]) -> Option<usize> {
        if self.signature.is_empty() || data.len() < self.leading + self.signature.len() {
            return None;
        }
        // A match of the full pattern at offset `o` is a match of the
        // effective signature at `o` within `data[leading..]`, so the
        // offset comes back unadjusted.
        let haystack = &data[self.leading..];
        match self.mode {
            ScanMode::Single => single::find(haystack, 0, haystack.len(), self),
            // SAFETY: the mode is only selected when the corresponding CPU
            // features were detected at runtime.
            #[cfg(target_arch = "x86_64")]
            ScanMode::Sse => unsafe { sse::find(haystack, self) },
            #[cfg(target_arch = "x86_64")]
            ScanMode::Avx2 => unsafe { avx2::find(haystack, self) },
            #[cfg(target_arch = "x86_64")]
            ScanMode::Avx512 => unsafe { avx512::find(haystack, self) },
        }
    }

    /// Runs the scan over a read-only range.
    pub fn scan<'d>(&self, data: &'d [u8]) -> ScanResult<'d> {
        ScanResult::new(self.find(data).map(|offset| &data[offset..]))
    }

    #[cfg(test)]
    pub(crate) fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }
}

/// How a matcher splits its range: scalar candidates `[0, pre_end)`, then
/// `vec_count` aligned vectors starting at byte offset `vec_off`, then
/// scalar candidates `[post_start, len)`.
#[cfg_attr(not(target_arch = "x86_64"), allow(dead_code))]
pub(crate) struct Segments {
    pub pre_end: usize,
    pub vec_off: usize,
    pub vec_count: usize,
    pub post_start: usize,
}

/// Splits a haystack for a matcher of the given vector width.
///
/// Every vector position needs a full aligned `width`-byte load, and every
/// candidate it can produce needs a verification read (`width` bytes on the
/// fast path, the signature length otherwise) that stays inside the
/// haystack. Returns `None` when no vector position satisfies both, in
/// which case the whole range belongs to the scalar matcher.
#[cfg_attr(not(target_arch = "x86_64"), allow(dead_code))]
pub(crate) fn segment(haystack: &[u8], width: usize, n: usize, pivot: usize) -> Option<Segments> {
    debug_assert!(n >= 1 && pivot < n);
    let len = haystack.len();
    if len < n || len < width {
        return None;
    }

    let vec_off = pivot + haystack[pivot..].as_ptr().align_offset(width);
    let verify_len = if n <= width { width } else { n };
    // v + width <= len, and the worst candidate v + width - 1 - pivot must
    // leave room for its verification read.
    let limit_load = len.checked_sub(width)?;
    let limit_verify = (len + pivot + 1).checked_sub(width + verify_len)?;
    let last_vec = limit_load.min(limit_verify);
    if vec_off > last_vec {
        return None;
    }
    let vec_count = (last_vec - vec_off) / width + 1;

    Some(Segments {
        pre_end: vec_off - pivot,
        vec_off,
        vec_count,
        post_start: vec_off + vec_count * width - pivot,
    })
}

/// Bitmask of the lanes inside a vector block starting at offset `vec_off`
/// that sit on 16-byte candidate boundaries. Constant across the blocks of
/// one scan since the width is a multiple of 16.
#[cfg_attr(not(target_arch = "x86_64"), allow(dead_code))]
pub(crate) fn x16_lane_mask(vec_off: usize, width: usize) -> u64 {
    let mut mask = 0u64;
    let mut lane = (16 - vec_off % 16) % 16;
    while lane < width {
        mask |= 1 << lane;
        lane += 16;
    }
    mask
}

/// Finds the first match of `signature` in `data`.
///
/// The result borrows `data` read-only; scanning a mutable range through
/// [`find_one_mut`] yields a mutable result instead.
pub fn find_one<'d>(
    data: &'d [u8],
    signature: &[SignatureElement],
    alignment: ScanAlignment,
    hints: ScanHints,
) -> ScanResult<'d> {
    ScanContext::new(signature, alignment, hints).scan(data)
}

/// Finds the first match of `signature` in a mutable range.
pub fn find_one_mut<'d>(
    data: &'d mut [u8],
    signature: &[SignatureElement],
    alignment: ScanAlignment,
    hints: ScanHints,
) -> ScanResultMut<'d> {
    match ScanContext::new(signature, alignment, hints).find(data) {
        Some(offset) => ScanResultMut::new(Some(&mut data[offset..])),
        None => ScanResultMut::new(None),
    }
}

/// Returns an iterator over every match of `signature` in `data`, in
/// strictly ascending offset order.
///
/// The cursor advances by the alignment stride after each hit, so at
/// [`ScanAlignment::X1`] overlapping matches on successive bytes are all
/// reported. The iterator is lazy: collect it for every match, `take` or
/// break early for a bounded scan.
pub fn find_all<'d, 'sig>(
    data: &'d [u8],
    signature: &'sig [SignatureElement],
    alignment: ScanAlignment,
    hints: ScanHints,
) -> FindAll<'d, 'sig> {
    FindAll {
        context: ScanContext::new(signature, alignment, hints),
        data,
        cursor: 0,
        done: false,
    }
}

/// Iterator over all match offsets in a range. Created by [`find_all`].
#[derive(Clone, Debug)]
pub struct FindAll<'d, 'sig> {
    context: ScanContext<'sig>,
    data: &'d [u8],
    cursor: usize,
    done: bool,
}

impl Iterator for FindAll<'_, '_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.done {
            return None;
        }
        match self.context.find(&self.data[self.cursor..]) {
            Some(relative) => {
                let offset = self.cursor + relative;
                let next = offset + self.context.alignment.stride();
                if next > self.data.len() {
                    self.done = true;
                } else {
                    self.cursor = next;
                }
                Some(offset)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl core::iter::FusedIterator for FindAll<'_, '_> {}

/// Finds the first match of `signature` inside a named section of a module.
///
/// Resolution failures (no such section, empty span) pass through as "not
/// found".
#[cfg(feature = "process")]
pub fn find_one_in_section(
    signature: &[SignatureElement],
    section: &str,
    module: crate::process::Module,
    alignment: ScanAlignment,
    hints: ScanHints,
) -> ScanResult<'static> {
    match module.section_data(section) {
        Some(data) if !data.is_empty() => find_one(data, signature, alignment, hints),
        _ => ScanResult::not_found(),
    }
}

/// Compile-time capable scan with the scalar matcher.
///
/// Semantically identical to [`find_one`]: leading wildcards are stripped
/// transparently and both alignments are supported.
pub const fn find_one_const(
    data: &[u8],
    signature: &[SignatureElement],
    alignment: ScanAlignment,
) -> Option<usize> {
    let mut leading = 0;
    while leading < signature.len() && signature[leading].is_wildcard() {
        leading += 1;
    }
    let (_, effective) = signature.split_at(leading);
    if effective.is_empty() || data.len() < leading + effective.len() {
        return None;
    }
    let (_, haystack) = data.split_at(leading);
    single::find_const(haystack, effective, alignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Signature;

    fn modes_to_test() -> Vec<ScanMode> {
        let mut modes = vec![ScanMode::Single];
        #[cfg(target_arch = "x86_64")]
        {
            let features = system::features();
            if features.sse2 && features.sse41 {
                modes.push(ScanMode::Sse);
            }
            if features.avx2 && features.bmi1 {
                modes.push(ScanMode::Avx2);
            }
            if features.avx512f && features.avx512bw && features.bmi1 {
                modes.push(ScanMode::Avx512);
            }
        }
        modes
    }

    /// Every available matcher must agree with the scalar reference on
    /// every buffer size and match offset.
    #[test]
    fn matchers_agree_with_scalar_reference() {
        let signatures = [
            Signature::parse("01").unwrap(),
            Signature::parse("01 02 03").unwrap(),
            Signature::parse("01 ?? 03 04").unwrap(),
            Signature::parse("01 02 ?? ?? 05 06 07 08").unwrap(),
            Signature::parse("01 0? ?3").unwrap(),
        ];
        for signature in &signatures {
            let n = signature.len();
            for size in n..160 {
                for offset in 0..=(size - n) {
                    let mut data = vec![0u8; size];
                    for (i, element) in signature.iter().enumerate() {
                        data[offset + i] = element.value();
                    }
                    for alignment in [ScanAlignment::X1, ScanAlignment::X16] {
                        let context =
                            ScanContext::new(signature, alignment, ScanHints::empty());
                        let expected = context.with_mode(ScanMode::Single).find(&data);
                        for mode in modes_to_test() {
                            let got = context.with_mode(mode).find(&data);
                            assert_eq!(
                                got, expected,
                                "signature {signature}, size {size}, offset {offset}, \
                                 alignment {alignment:?}, mode {mode:?}"
                            );
                        }
                    }
                }
            }
        }
    }

    /// The pivot never changes which offset is reported.
    #[test]
    fn pivot_choice_does_not_change_results() {
        let signature = Signature::parse("48 8B 05 ?? ?? ?? ?? C3").unwrap();
        let mut data = vec![0x48u8; 300];
        data[200..208].copy_from_slice(&[0x48, 0x8B, 0x05, 1, 2, 3, 4, 0xC3]);

        let mut offsets = Vec::new();
        for hints in [
            ScanHints::empty(),
            ScanHints::X86_64,
            ScanHints::PAIR0,
            ScanHints::X86_64 | ScanHints::PAIR0,
        ] {
            let context = ScanContext::new(&signature, ScanAlignment::X1, hints);
            offsets.push(context.find(&data));
        }
        assert!(offsets.iter().all(|&offset| offset == Some(200)));
    }

    #[test]
    fn frequency_hint_prefers_rare_pairs() {
        // 00 00 is the most common pair in the table; 0F 84 ranks far
        // rarer, so the biased pivot moves off the leading pair.
        let signature = Signature::parse("00 00 0F 84").unwrap();
        let pivot = select_pivot(
            &signature,
            32,
            ScanAlignment::X1,
            ScanHints::X86_64,
        );
        assert_eq!(pivot, Some(2));

        let unbiased = select_pivot(&signature, 32, ScanAlignment::X1, ScanHints::empty());
        assert_eq!(unbiased, Some(0));
    }

    #[test]
    fn pair0_inhibits_interior_pivots() {
        let signature = Signature::parse("48 ?? 8B 05").unwrap();
        let pivot = select_pivot(&signature, 32, ScanAlignment::X1, ScanHints::PAIR0);
        assert_eq!(pivot, None);

        let free = select_pivot(&signature, 32, ScanAlignment::X1, ScanHints::empty());
        assert_eq!(free, Some(2));
    }

    #[test]
    fn x16_has_no_pivot() {
        let signature = Signature::parse("48 8B 05").unwrap();
        let pivot = select_pivot(&signature, 32, ScanAlignment::X16, ScanHints::X86_64);
        assert_eq!(pivot, None);
    }

    #[test]
    fn segments_cover_all_candidates_exactly_once() {
        for len in 1..256 {
            let haystack = vec![0u8; len];
            for width in [16usize, 32, 64] {
                for n in [1usize, 3, 8, 70] {
                    for pivot in [0, 1.min(n - 1)] {
                        let Some(seg) = segment(&haystack, width, n, pivot) else {
                            continue;
                        };
                        assert_eq!((haystack.as_ptr() as usize + seg.vec_off) % width, 0);
                        assert!(seg.pre_end <= len);
                        assert_eq!(seg.pre_end, seg.vec_off - pivot);
                        assert_eq!(
                            seg.post_start,
                            seg.vec_off + seg.vec_count * width - pivot
                        );
                        // Last vector's full load and worst-case verify stay
                        // in bounds.
                        let last = seg.vec_off + (seg.vec_count - 1) * width;
                        let verify_len = if n <= width { width } else { n };
                        assert!(last + width <= len);
                        assert!(last + width - 1 - pivot + verify_len <= len);
                    }
                }
            }
        }
    }

    #[test]
    fn x16_lane_mask_marks_aligned_candidates() {
        assert_eq!(x16_lane_mask(0, 32), 0x0001_0001);
        assert_eq!(x16_lane_mask(16, 32), 0x0001_0001);
        assert_eq!(x16_lane_mask(1, 32), 0x8000_8000);
        for vec_off in 0..64usize {
            let mask = x16_lane_mask(vec_off, 64);
            for lane in 0..64usize {
                let expected = (vec_off + lane) % 16 == 0;
                assert_eq!(mask >> lane & 1 == 1, expected);
            }
        }
    }

    #[test]
    fn compile_time_scan_matches_runtime() {
        const DATA: &[u8] = b"\x01\x02\x03\x04\x05\x01\x02\x99\x04\x05";
        const SIG: crate::signature::FixedSignature<5> =
            crate::signature::FixedSignature::parse("01 02 ? 04 05");
        const FOUND: Option<usize> = find_one_const(DATA, SIG.elements(), ScanAlignment::X1);
        assert_eq!(FOUND, Some(0));

        let runtime = ScanContext::new(SIG.elements(), ScanAlignment::X1, ScanHints::empty())
            .find(DATA);
        assert_eq!(runtime, FOUND);
    }
}
