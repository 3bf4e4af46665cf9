//! Scan results and the helpers to decode data around a match.

use core::fmt;
use core::mem;

use bytemuck::AnyBitPattern;

/// A trait for converting a value from big or little endian.
#[allow(clippy::wrong_self_convention)]
pub trait FromEndian: Sized {
    /// Converts the value from big endian.
    fn from_be(&self) -> Self;
    /// Converts the value from little endian.
    fn from_le(&self) -> Self;
}

macro_rules! define_endian {
    ($($name:ident),*) => {$(
        impl FromEndian for $name {
            #[inline]
            fn from_be(&self) -> Self {
                Self::from_be_bytes(bytemuck::cast(*self))
            }
            #[inline]
            fn from_le(&self) -> Self {
                Self::from_le_bytes(bytemuck::cast(*self))
            }
        }
    )*};
}

define_endian!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

/// The outcome of a scan over a read-only range: either "not found" or a
/// match borrowing the scanned range from the matched byte to its end.
///
/// The borrow keeps the usual helpers bounds-checked: reads through
/// [`read`](Self::read) and [`index`](Self::index) can only touch bytes of
/// the range that was scanned.
#[derive(Copy, Clone)]
pub struct ScanResult<'a> {
    inner: Option<&'a [u8]>,
}

impl<'a> ScanResult<'a> {
    #[inline]
    pub(crate) const fn new(inner: Option<&'a [u8]>) -> Self {
        Self { inner }
    }

    /// The "not found" result.
    #[inline]
    pub const fn not_found() -> Self {
        Self { inner: None }
    }

    /// Checks whether a match was found.
    #[inline]
    pub const fn has_result(&self) -> bool {
        self.inner.is_some()
    }

    /// Returns the bytes from the match to the end of the scanned range.
    #[inline]
    pub const fn get(&self) -> Option<&'a [u8]> {
        self.inner
    }

    /// Returns a pointer to the first matched byte.
    #[inline]
    pub fn as_ptr(&self) -> Option<*const u8> {
        Some(self.inner?.as_ptr())
    }

    /// Reads a little-endian value at the given byte offset from the match.
    ///
    /// Returns `None` on "not found" or when the read would leave the
    /// scanned range.
    pub fn read<T: AnyBitPattern + FromEndian>(&self, offset: usize) -> Option<T> {
        let end = offset.checked_add(mem::size_of::<T>())?;
        let bytes = self.inner?.get(offset..end)?;
        Some(bytemuck::pod_read_unaligned::<T>(bytes).from_le())
    }

    /// Resolves a RIP-relative operand: reads the signed 32-bit displacement
    /// at `offset` and returns `match + displacement + offset + 4 +
    /// remaining`, where `remaining` is the number of instruction bytes
    /// following the displacement.
    ///
    /// The referent is commonly outside the scanned range, so the result is
    /// a raw pointer.
    pub fn rel(&self, offset: usize, remaining: usize) -> Option<*const u8> {
        let displacement = self.read::<i32>(offset)?;
        let base = self.inner?.as_ptr();
        Some(
            base.wrapping_add(offset + mem::size_of::<i32>() + remaining)
                .wrapping_offset(displacement as isize),
        )
    }

    /// Reads an integer at `offset`, interprets it as a byte offset into an
    /// array of `T`, and returns the element index.
    pub fn index<I, T>(&self, offset: usize) -> Option<usize>
    where
        I: AnyBitPattern + FromEndian + TryInto<usize>,
    {
        if mem::size_of::<T>() == 0 {
            return None;
        }
        let raw: usize = self.read::<I>(offset)?.try_into().ok()?;
        Some(raw / mem::size_of::<T>())
    }
}

impl fmt::Debug for ScanResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner {
            Some(bytes) => write!(f, "ScanResult({:p})", bytes.as_ptr()),
            None => f.write_str("ScanResult(not found)"),
        }
    }
}

/// The outcome of a scan over a mutable range.
///
/// The sibling of [`ScanResult`]: a caller that supplied a read-only range
/// can never obtain a mutable pointer from its result, while a mutable
/// range yields this type and write access to the matched bytes.
pub struct ScanResultMut<'a> {
    inner: Option<&'a mut [u8]>,
}

impl<'a> ScanResultMut<'a> {
    #[inline]
    pub(crate) fn new(inner: Option<&'a mut [u8]>) -> Self {
        Self { inner }
    }

    /// Checks whether a match was found.
    #[inline]
    pub const fn has_result(&self) -> bool {
        self.inner.is_some()
    }

    /// Returns the bytes from the match to the end of the scanned range.
    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut [u8]> {
        self.inner.as_deref_mut()
    }

    /// Consumes the result, returning the matched bytes for the full
    /// lifetime of the range.
    #[inline]
    pub fn into_inner(self) -> Option<&'a mut [u8]> {
        self.inner
    }

    /// Reborrows as a read-only result for the decoding helpers.
    #[inline]
    pub fn as_shared(&self) -> ScanResult<'_> {
        ScanResult::new(self.inner.as_deref())
    }

    /// Reads a little-endian value at the given byte offset from the match.
    pub fn read<T: AnyBitPattern + FromEndian>(&self, offset: usize) -> Option<T> {
        self.as_shared().read(offset)
    }

    /// Resolves a RIP-relative operand. See [`ScanResult::rel`].
    pub fn rel(&mut self, offset: usize, remaining: usize) -> Option<*mut u8> {
        let displacement = self.as_shared().read::<i32>(offset)?;
        let base = self.inner.as_mut()?.as_mut_ptr();
        Some(
            base.wrapping_add(offset + mem::size_of::<i32>() + remaining)
                .wrapping_offset(displacement as isize),
        )
    }

    /// Reads an integer at `offset` as an index into an array of `T`. See
    /// [`ScanResult::index`].
    pub fn index<I, T>(&self, offset: usize) -> Option<usize>
    where
        I: AnyBitPattern + FromEndian + TryInto<usize>,
    {
        self.as_shared().index::<I, T>(offset)
    }
}

impl fmt::Debug for ScanResultMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(bytes) => write!(f, "ScanResultMut({:p})", bytes.as_ptr()),
            None => f.write_str("ScanResultMut(not found)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_is_little_endian_and_bounded() {
        let data = [0x01u8, 0x02, 0x03, 0x04, 0x05];
        let result = ScanResult::new(Some(&data[1..]));
        assert_eq!(result.read::<u16>(0), Some(0x0302));
        assert_eq!(result.read::<u32>(0), Some(0x0504_0302));
        assert_eq!(result.read::<u32>(1), None);
        assert_eq!(ScanResult::not_found().read::<u8>(0), None);
    }

    #[test]
    fn rel_resolves_displacements() {
        // E8 <disp32> with disp = -2, one trailing byte.
        let data = [0xE8u8, 0xFE, 0xFF, 0xFF, 0xFF, 0x90];
        let result = ScanResult::new(Some(&data[..]));
        let target = result.rel(1, 1).unwrap();
        // match + disp + 1 + 4 + 1 = match + 4
        assert_eq!(target, data[4..].as_ptr());
        assert_eq!(result.rel(3, 0), None);
    }

    #[test]
    fn index_divides_by_element_size() {
        let data = 0x20u32.to_le_bytes();
        let result = ScanResult::new(Some(&data[..]));
        assert_eq!(result.index::<u32, u64>(0), Some(4));
        assert_eq!(result.index::<i32, u8>(0), Some(0x20));
    }
}
