//! Scoped memory protection changes.

use core::fmt;

bitflags::bitflags! {
    /// Memory protection flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Protection: u8 {
        /// The memory can be read.
        const READ = 1 << 0;
        /// The memory can be written.
        const WRITE = 1 << 1;
        /// The memory can be executed.
        const EXECUTE = 1 << 2;
    }
}

/// The ways a protection change can fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtectError {
    /// The existing protection of the range could not be determined.
    #[error("could not determine the existing protection of the range")]
    UnknownProtection,
    /// The operating system rejected the protection change.
    #[error("the protection change was rejected by the operating system")]
    Rejected,
    /// Changing protection is not supported on this platform.
    #[error("changing protection is not supported on this platform")]
    Unsupported,
}

/// Changes the protection of a memory range on construction and restores
/// the previous protection when dropped.
///
/// The scan engine never calls this itself; it exists for consumers that
/// want to patch a region they have located.
pub struct MemoryProtector {
    address: usize,
    size: usize,
    /// Previous protection in the operating system's native encoding.
    old: u32,
}

impl MemoryProtector {
    /// Applies `protection` to the pages covering `[address, address +
    /// size)`.
    ///
    /// # Safety
    ///
    /// The range must be mapped, and making it writable or executable must
    /// not break invariants other code relies on. Releasing the returned
    /// guard restores the protection recorded at this call, not any change
    /// made in between.
    pub unsafe fn new(
        address: usize,
        size: usize,
        protection: Protection,
    ) -> Result<Self, ProtectError> {
        let old = imp::protect(address, size, protection)?;
        Ok(Self { address, size, old })
    }
}

impl Drop for MemoryProtector {
    fn drop(&mut self) {
        // SAFETY: the guard was constructed over a mapped range.
        if let Err(err) = unsafe { imp::restore(self.address, self.size, self.old) } {
            log::warn!(
                "failed to restore protection of {:#x}..{:#x}: {err}",
                self.address,
                self.address + self.size
            );
        }
    }
}

impl fmt::Debug for MemoryProtector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryProtector")
            .field("address", &format_args!("{:#x}", self.address))
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use super::{ProtectError, Protection};

    fn page_size() -> usize {
        // SAFETY: sysconf is always safe to call.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            4096
        }
    }

    fn page_range(address: usize, size: usize) -> (usize, usize) {
        let page = page_size();
        let start = address & !(page - 1);
        let end = (address + size + page - 1) & !(page - 1);
        (start, end - start)
    }

    fn to_native(protection: Protection) -> libc::c_int {
        let mut native = 0;
        if protection.contains(Protection::READ) {
            native |= libc::PROT_READ;
        }
        if protection.contains(Protection::WRITE) {
            native |= libc::PROT_WRITE;
        }
        if protection.contains(Protection::EXECUTE) {
            native |= libc::PROT_EXEC;
        }
        native
    }

    /// Looks up the current protection of the page containing `address`
    /// from `/proc/self/maps`.
    fn page_protection(address: usize) -> Option<u32> {
        let maps = std::fs::read_to_string("/proc/self/maps").ok()?;
        for line in maps.lines() {
            let Some((range, rest)) = line.split_once(' ') else {
                continue;
            };
            let Some((start, end)) = range.split_once('-') else {
                continue;
            };
            let (Ok(start), Ok(end)) = (
                usize::from_str_radix(start, 16),
                usize::from_str_radix(end, 16),
            ) else {
                continue;
            };
            if address < start || address >= end {
                continue;
            }
            let perms = rest.as_bytes();
            if perms.len() < 3 {
                return None;
            }
            let mut native = 0;
            if perms[0] == b'r' {
                native |= libc::PROT_READ;
            }
            if perms[1] == b'w' {
                native |= libc::PROT_WRITE;
            }
            if perms[2] == b'x' {
                native |= libc::PROT_EXEC;
            }
            return Some(native as u32);
        }
        None
    }

    pub(super) unsafe fn protect(
        address: usize,
        size: usize,
        protection: Protection,
    ) -> Result<u32, ProtectError> {
        let old = page_protection(address).ok_or(ProtectError::UnknownProtection)?;
        let (start, len) = page_range(address, size);
        if libc::mprotect(start as *mut libc::c_void, len, to_native(protection)) != 0 {
            return Err(ProtectError::Rejected);
        }
        Ok(old)
    }

    pub(super) unsafe fn restore(address: usize, size: usize, old: u32) -> Result<(), ProtectError> {
        let (start, len) = page_range(address, size);
        if libc::mprotect(start as *mut libc::c_void, len, old as libc::c_int) != 0 {
            return Err(ProtectError::Rejected);
        }
        Ok(())
    }
}

#[cfg(windows)]
mod imp {
    use windows_sys::Win32::System::Memory::{
        VirtualProtect, PAGE_EXECUTE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_NOACCESS,
        PAGE_READONLY, PAGE_READWRITE,
    };

    use super::{ProtectError, Protection};

    fn to_native(protection: Protection) -> u32 {
        let read = protection.contains(Protection::READ);
        let write = protection.contains(Protection::WRITE);
        let execute = protection.contains(Protection::EXECUTE);
        match (read, write, execute) {
            (_, true, true) => PAGE_EXECUTE_READWRITE,
            (true, false, true) => PAGE_EXECUTE_READ,
            (false, false, true) => PAGE_EXECUTE,
            (_, true, false) => PAGE_READWRITE,
            (true, false, false) => PAGE_READONLY,
            (false, false, false) => PAGE_NOACCESS,
        }
    }

    pub(super) unsafe fn protect(
        address: usize,
        size: usize,
        protection: Protection,
    ) -> Result<u32, ProtectError> {
        let mut old = 0u32;
        let ok = VirtualProtect(
            address as *const core::ffi::c_void,
            size,
            to_native(protection),
            &mut old,
        );
        if ok == 0 {
            return Err(ProtectError::Rejected);
        }
        Ok(old)
    }

    pub(super) unsafe fn restore(address: usize, size: usize, old: u32) -> Result<(), ProtectError> {
        let mut previous = 0u32;
        let ok = VirtualProtect(address as *const core::ffi::c_void, size, old, &mut previous);
        if ok == 0 {
            return Err(ProtectError::Rejected);
        }
        Ok(())
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod imp {
    use super::{ProtectError, Protection};

    pub(super) unsafe fn protect(
        _address: usize,
        _size: usize,
        _protection: Protection,
    ) -> Result<u32, ProtectError> {
        Err(ProtectError::Unsupported)
    }

    pub(super) unsafe fn restore(
        _address: usize,
        _size: usize,
        _old: u32,
    ) -> Result<(), ProtectError> {
        Err(ProtectError::Unsupported)
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn round_trips_protection_on_owned_pages() {
        const LEN: usize = 8192;
        // A private mapping, so no other thread can touch the pages while
        // they are read-only.
        let mapping = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                LEN,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(mapping, libc::MAP_FAILED);
        let address = mapping as usize;

        // SAFETY: the mapping is owned by this test.
        unsafe {
            let guard = MemoryProtector::new(address, 16, Protection::READ)
                .expect("change protection of owned pages");
            drop(guard);
            // Writable again after the guard restored the mapping.
            *(mapping as *mut u8) = 0xAA;
            assert_eq!(*(mapping as *const u8), 0xAA);
            libc::munmap(mapping, LEN);
        }
    }
}
