//! Support for mapped ELF images.
//!
//! Only the identification bytes and the program headers matter at run
//! time: the section header table is not part of the loaded image, so
//! named lookups go through segment protection flags instead.

#![cfg_attr(not(target_os = "linux"), allow(dead_code))]

use bytemuck::{Pod, Zeroable};

use crate::protect::Protection;

// Reference:
// https://refspecs.linuxfoundation.org/elf/elf.pdf

#[derive(Debug, Copy, Clone, Zeroable, Pod)]
#[repr(C)]
struct Identification {
    magic: [u8; 4],  // 0x7f, 'E', 'L', 'F'
    class: u8,       // 32 or 64
    data: u8,        // little or big endian
    version: u8,     // 1
    os_abi: u8,      // 0
    abi_version: u8, // 0
    _padding: [u8; 7],
}

/// Checks the ELF identification bytes of an image prefix.
pub(crate) fn validate(headers: &[u8]) -> bool {
    let Some(bytes) = headers.get(..core::mem::size_of::<Identification>()) else {
        return false;
    };
    let ident: Identification = bytemuck::pod_read_unaligned(bytes);
    ident.magic == *b"\x7fELF"
}

/// The protection profile a well-known section name maps to: flags the
/// carrying segment must have and flags it must not have.
pub(crate) fn section_protection(name: &str) -> Option<(Protection, Protection)> {
    match name {
        ".text" => Some((
            Protection::READ | Protection::EXECUTE,
            Protection::WRITE,
        )),
        ".rodata" => Some((
            Protection::READ,
            Protection::WRITE | Protection::EXECUTE,
        )),
        ".data" => Some((
            Protection::READ | Protection::WRITE,
            Protection::EXECUTE,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_magic() {
        let mut image = vec![0u8; 64];
        image[..4].copy_from_slice(b"\x7fELF");
        assert!(validate(&image));
        assert!(!validate(b"\x7fELF"));
        assert!(!validate(&[0u8; 64]));
    }

    #[test]
    fn maps_well_known_sections() {
        let (required, forbidden) = section_protection(".text").unwrap();
        assert_eq!(required, Protection::READ | Protection::EXECUTE);
        assert_eq!(forbidden, Protection::WRITE);
        assert!(section_protection(".comment").is_none());
    }
}
