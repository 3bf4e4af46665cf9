//! High-throughput scanning for byte patterns ("signatures") in arbitrary
//! byte ranges.
//!
//! A signature is a sequence of (value, mask) byte elements: a byte `b`
//! matches an element iff `b & mask == value`. Fully specified bytes, full
//! wildcards and bit-masked bytes can be mixed freely. Signatures known at
//! build time can be parsed at compile time with [`FixedSignature`], making
//! an invalid pattern a build failure.
//!
//! Scanning picks the widest SIMD matcher the current CPU supports (128,
//! 256 or 512 bit on x86-64) and falls back to a scalar reference matcher
//! everywhere else. All matchers produce identical results.
//!
//! ```
//! use sigscan::{find_one, ScanAlignment, ScanHints, Signature};
//!
//! let data = b"abcdefghijklmnopqrstuvwxyz0123456789";
//! let sig = Signature::parse("78 79 7A").unwrap();
//!
//! let result = find_one(data, &sig, ScanAlignment::X1, ScanHints::empty());
//! assert_eq!(result.get().map(|m| m.as_ptr()), Some(data[23..].as_ptr()));
//! ```

pub mod scanner;
pub mod signature;
pub mod system;

mod result;

#[cfg(feature = "ffi")]
pub mod ffi;
#[cfg(feature = "process")]
pub mod process;
#[cfg(feature = "process")]
pub mod protect;

pub use self::result::{FromEndian, ScanResult, ScanResultMut};
#[cfg(feature = "process")]
pub use self::scanner::find_one_in_section;
pub use self::scanner::{
    find_all, find_one, find_one_const, find_one_mut, FindAll, ScanAlignment, ScanContext,
    ScanHints,
};
pub use self::signature::{FixedSignature, ParseSignatureError, Signature, SignatureElement};
