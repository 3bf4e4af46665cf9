//! C ABI entry points.
//!
//! Signatures are returned as opaque heap objects and must be released
//! with [`sigscan_free_signature`]. Scan entry points return a pointer to
//! the first matched byte, or null for "not found" and for every
//! resolution failure.

use core::ffi::{c_char, CStr};

use crate::process;
use crate::scanner::{find_one, ScanAlignment, ScanHints};
use crate::signature::{ParseSignatureError, Signature, SignatureElement};

/// Status codes mirroring the parser error taxonomy.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SigscanStatus {
    /// The operation was successful.
    Ok = 0,
    /// An argument was invalid in a way the other codes do not describe.
    Unknown = 1,
    /// A single character token that is not `?`.
    ExpectedWildcard = 2,
    /// A token contained an invalid character.
    ElementParse = 3,
    /// A token had an unsupported length.
    InvalidTokenLength = 4,
    /// The signature contained no elements.
    EmptySignature = 5,
    /// The first element is not a fully specified byte.
    IllegalFirstByte = 6,
    /// The signature consists only of wildcards.
    MissingMaskedByte = 7,
}

impl From<ParseSignatureError> for SigscanStatus {
    fn from(err: ParseSignatureError) -> Self {
        match err {
            ParseSignatureError::ExpectedWildcard => Self::ExpectedWildcard,
            ParseSignatureError::ElementParse => Self::ElementParse,
            ParseSignatureError::InvalidTokenLength => Self::InvalidTokenLength,
            ParseSignatureError::EmptySignature => Self::EmptySignature,
            ParseSignatureError::IllegalFirstByte => Self::IllegalFirstByte,
            ParseSignatureError::MissingMaskedByte => Self::MissingMaskedByte,
        }
    }
}

/// Candidate alignment for the scan entry points.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SigscanAlignment {
    /// Test every byte offset.
    X1 = 0,
    /// Test 16-byte aligned offsets only.
    X16 = 1,
}

impl From<SigscanAlignment> for ScanAlignment {
    fn from(alignment: SigscanAlignment) -> Self {
        match alignment {
            SigscanAlignment::X1 => Self::X1,
            SigscanAlignment::X16 => Self::X16,
        }
    }
}

/// Parses a signature from a NUL terminated pattern string.
///
/// On success `*out` receives a heap signature to be released with
/// [`sigscan_free_signature`].
///
/// # Safety
///
/// `pattern` must be a valid NUL terminated string and `out` a valid
/// pointer.
#[no_mangle]
pub unsafe extern "C" fn sigscan_parse_signature(
    pattern: *const c_char,
    out: *mut *mut Signature,
) -> SigscanStatus {
    if pattern.is_null() || out.is_null() {
        return SigscanStatus::Unknown;
    }
    let Ok(pattern) = CStr::from_ptr(pattern).to_str() else {
        return SigscanStatus::Unknown;
    };
    match Signature::parse(pattern) {
        Ok(signature) => {
            *out = Box::into_raw(Box::new(signature));
            SigscanStatus::Ok
        }
        Err(err) => err.into(),
    }
}

/// Builds a signature from parallel value and mask buffers of `len` bytes.
/// A zero mask byte is a wildcard.
///
/// # Safety
///
/// `values` and `masks` must point at `len` readable bytes each and `out`
/// must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn sigscan_create_signature(
    values: *const u8,
    masks: *const u8,
    len: usize,
    out: *mut *mut Signature,
) -> SigscanStatus {
    if values.is_null() || masks.is_null() || out.is_null() {
        return SigscanStatus::Unknown;
    }
    let values = core::slice::from_raw_parts(values, len);
    let masks = core::slice::from_raw_parts(masks, len);
    let elements = values
        .iter()
        .zip(masks)
        .map(|(&value, &mask)| SignatureElement::new(value, mask));
    match Signature::from_elements(elements) {
        Ok(signature) => {
            *out = Box::into_raw(Box::new(signature));
            SigscanStatus::Ok
        }
        Err(err) => err.into(),
    }
}

/// Scans a buffer, returning a pointer to the first match or null.
///
/// # Safety
///
/// `signature` must come from this library and `data` must point at `len`
/// readable bytes.
#[no_mangle]
pub unsafe extern "C" fn sigscan_find_pattern(
    signature: *const Signature,
    data: *const u8,
    len: usize,
    alignment: SigscanAlignment,
) -> *const u8 {
    if signature.is_null() || data.is_null() {
        return core::ptr::null();
    }
    let data = core::slice::from_raw_parts(data, len);
    let result = find_one(data, &*signature, alignment.into(), ScanHints::empty());
    result.as_ptr().unwrap_or(core::ptr::null())
}

/// Scans a module's named section, or the whole module when `section` is
/// null. A null `module` means the process executable.
///
/// # Safety
///
/// `signature` must come from this library, `module` must be null or a
/// module base address, and `section` must be null or NUL terminated.
#[no_mangle]
pub unsafe extern "C" fn sigscan_find_pattern_mod(
    signature: *const Signature,
    module: *const u8,
    section: *const c_char,
    alignment: SigscanAlignment,
) -> *const u8 {
    if signature.is_null() {
        return core::ptr::null();
    }
    let module = if module.is_null() {
        process::get_process_module()
    } else {
        match process::module_at(module, None) {
            Some(module) => module,
            None => return core::ptr::null(),
        }
    };
    let data = if section.is_null() {
        module.data()
    } else {
        match CStr::from_ptr(section).to_str() {
            Ok(name) => module.section_data(name),
            Err(_) => return core::ptr::null(),
        }
    };
    let Some(data) = data else {
        return core::ptr::null();
    };
    let result = find_one(data, &*signature, alignment.into(), ScanHints::empty());
    result.as_ptr().unwrap_or(core::ptr::null())
}

/// Resolves a module base address by name, or the process executable for a
/// null name. Returns null when the module is not loaded.
///
/// # Safety
///
/// `name` must be null or a valid NUL terminated string.
#[no_mangle]
pub unsafe extern "C" fn sigscan_get_module(name: *const c_char) -> *const u8 {
    if name.is_null() {
        return process::get_process_module().address();
    }
    let Ok(name) = CStr::from_ptr(name).to_str() else {
        return core::ptr::null();
    };
    match process::get_module(name) {
        Some(module) => module.address(),
        None => core::ptr::null(),
    }
}

/// Releases a signature returned by the parse or create entry points.
///
/// # Safety
///
/// `signature` must be null or an unreleased pointer from this library.
#[no_mangle]
pub unsafe extern "C" fn sigscan_free_signature(signature: *mut Signature) {
    if !signature.is_null() {
        drop(Box::from_raw(signature));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scan_free_round_trip() {
        let mut signature = core::ptr::null_mut();
        let status = unsafe {
            sigscan_parse_signature(c"01 02 ?? 04".as_ptr(), &mut signature)
        };
        assert_eq!(status, SigscanStatus::Ok);
        assert!(!signature.is_null());

        let data = [0x00u8, 0x01, 0x02, 0x7F, 0x04, 0x00];
        let found = unsafe {
            sigscan_find_pattern(signature, data.as_ptr(), data.len(), SigscanAlignment::X1)
        };
        assert_eq!(found, data[1..].as_ptr());

        unsafe { sigscan_free_signature(signature) };
    }

    #[test]
    fn parse_reports_taxonomy() {
        let mut signature = core::ptr::null_mut();
        let status = unsafe { sigscan_parse_signature(c"? ? ?".as_ptr(), &mut signature) };
        assert_eq!(status, SigscanStatus::MissingMaskedByte);
        assert_eq!(
            unsafe { sigscan_parse_signature(core::ptr::null(), &mut signature) },
            SigscanStatus::Unknown
        );
    }

    #[test]
    fn create_validates_masks() {
        let mut signature = core::ptr::null_mut();
        let status = unsafe {
            sigscan_create_signature([0u8; 3].as_ptr(), [0u8; 3].as_ptr(), 3, &mut signature)
        };
        assert_eq!(status, SigscanStatus::MissingMaskedByte);

        let status = unsafe {
            sigscan_create_signature(
                [0x00u8, 0x48, 0x8B].as_ptr(),
                [0x00u8, 0xFF, 0xFF].as_ptr(),
                3,
                &mut signature,
            )
        };
        assert_eq!(status, SigscanStatus::Ok);
        unsafe { sigscan_free_signature(signature) };
    }
}
