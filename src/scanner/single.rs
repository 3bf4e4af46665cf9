//! The scalar matcher: the correctness reference, the head/tail fallback
//! for the vectorized matchers, and the only matcher usable at compile
//! time.

use crate::signature::SignatureElement;

use super::{ScanAlignment, ScanContext};

/// Checks the whole signature at candidate offset `at`. The caller
/// guarantees `at + signature.len() <= haystack.len()`.
#[inline]
pub(crate) const fn matches_at(
    haystack: &[u8],
    at: usize,
    signature: &[SignatureElement],
) -> bool {
    let mut i = 0;
    while i < signature.len() {
        if !signature[i].matches(haystack[at + i]) {
            return false;
        }
        i += 1;
    }
    true
}

/// Scans candidate offsets `[start, end)` of `haystack` for the context's
/// effective signature.
pub(crate) fn find(
    haystack: &[u8],
    start: usize,
    end: usize,
    context: &ScanContext<'_>,
) -> Option<usize> {
    let signature = context.signature();
    let last = haystack.len().checked_sub(signature.len())?;
    let end = end.min(last + 1);
    if start >= end {
        return None;
    }

    match context.alignment() {
        ScanAlignment::X16 => {
            let mut candidate = start.next_multiple_of(16);
            while candidate < end {
                if matches_at(haystack, candidate, signature) {
                    return Some(candidate);
                }
                candidate += 16;
            }
            None
        }
        ScanAlignment::X1 => {
            let first = signature[0];
            if first.is_exact() {
                // Locate the first byte with memchr, then verify the rest.
                let rest = &signature[1..];
                let mut cursor = start;
                while cursor < end {
                    let found = memchr::memchr(first.value(), &haystack[cursor..end])?;
                    let candidate = cursor + found;
                    if matches_at(haystack, candidate + 1, rest) {
                        return Some(candidate);
                    }
                    cursor = candidate + 1;
                }
                None
            } else {
                let mut candidate = start;
                while candidate < end {
                    if matches_at(haystack, candidate, signature) {
                        return Some(candidate);
                    }
                    candidate += 1;
                }
                None
            }
        }
    }
}

/// Compile-time twin of [`find`] over the whole haystack.
pub(crate) const fn find_const(
    haystack: &[u8],
    signature: &[SignatureElement],
    alignment: ScanAlignment,
) -> Option<usize> {
    if signature.is_empty() || haystack.len() < signature.len() {
        return None;
    }
    let last = haystack.len() - signature.len();
    let stride = alignment.stride();
    let mut candidate = 0;
    while candidate <= last {
        if matches_at(haystack, candidate, signature) {
            return Some(candidate);
        }
        candidate += stride;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{ScanHints, ScanMode};
    use crate::signature::Signature;

    fn context<'s>(signature: &'s Signature, alignment: ScanAlignment) -> ScanContext<'s> {
        ScanContext::new(signature, alignment, ScanHints::empty()).with_mode(ScanMode::Single)
    }

    #[test]
    fn finds_first_of_overlapping_candidates() {
        let signature = Signature::parse("01 01").unwrap();
        let data = [0x00, 0x01, 0x01, 0x01];
        let ctx = context(&signature, ScanAlignment::X1);
        assert_eq!(find(&data, 0, data.len(), &ctx), Some(1));
        assert_eq!(find(&data, 2, data.len(), &ctx), Some(2));
    }

    #[test]
    fn respects_candidate_window() {
        let signature = Signature::parse("05").unwrap();
        let data = [0x05, 0x00, 0x05, 0x00];
        let ctx = context(&signature, ScanAlignment::X1);
        assert_eq!(find(&data, 1, 2, &ctx), None);
        assert_eq!(find(&data, 1, 3, &ctx), Some(2));
    }

    #[test]
    fn steps_by_sixteen_at_x16() {
        let signature = Signature::parse("AB").unwrap();
        let mut data = [0u8; 64];
        data[8] = 0xAB;
        data[32] = 0xAB;
        let ctx = context(&signature, ScanAlignment::X16);
        assert_eq!(find(&data, 0, data.len(), &ctx), Some(32));
    }

    #[test]
    fn masked_leading_byte_skips_memchr() {
        let signature =
            Signature::from_elements([SignatureElement::new(0x40, 0xF0), SignatureElement::byte(0x10)])
                .unwrap();
        let data = [0x00, 0x4A, 0x10, 0x00];
        let ctx = context(&signature, ScanAlignment::X1);
        assert_eq!(find(&data, 0, data.len(), &ctx), Some(1));
    }

    #[test]
    fn const_scan_agrees() {
        const SIG: [SignatureElement; 2] =
            [SignatureElement::byte(0x01), SignatureElement::WILDCARD];
        const DATA: &[u8] = &[0x00, 0x02, 0x01, 0x7F];
        const AT: Option<usize> = find_const(DATA, &SIG, ScanAlignment::X1);
        assert_eq!(AT, Some(2));
        assert_eq!(find_const(DATA, &SIG, ScanAlignment::X16), None);
        assert_eq!(find_const(&[], &SIG, ScanAlignment::X1), None);
    }
}
