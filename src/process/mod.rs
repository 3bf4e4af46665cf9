//! Module and section resolution for the current process.
//!
//! The spans returned here borrow for `'static`: a module of the current
//! process is assumed to stay loaded for the life of the process. Callers
//! that unload libraries while holding spans are on their own, exactly as
//! they would be with raw module handles.

use crate::protect::Protection;

pub(crate) mod elf;
pub(crate) mod pe;

#[cfg(target_os = "linux")]
#[path = "linux.rs"]
mod imp;
#[cfg(windows)]
#[path = "windows.rs"]
mod imp;

/// Resolution is a no-op on platforms without a supported dynamic linker
/// interface: every lookup reports "not found".
#[cfg(not(any(target_os = "linux", windows)))]
mod imp {
    use super::Module;
    use crate::protect::Protection;

    pub(super) fn process_module() -> Module {
        Module::from_base(0)
    }

    pub(super) fn module_by_name(_name: &str) -> Option<Module> {
        None
    }

    pub(super) fn module_at(_address: *const u8, _size: Option<usize>) -> Option<Module> {
        None
    }

    pub(super) fn module_data(_module: Module) -> Option<&'static [u8]> {
        None
    }

    pub(super) fn section_data(_module: Module, _name: &str) -> Option<&'static [u8]> {
        None
    }

    pub(super) fn segments(_module: Module) -> Vec<(&'static [u8], Protection)> {
        Vec::new()
    }
}

/// A handle to a module loaded in the current process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Module {
    base: usize,
}

impl Module {
    #[inline]
    pub(crate) const fn from_base(base: usize) -> Self {
        Self { base }
    }

    /// The base address of the mapped image.
    #[inline]
    pub const fn address(self) -> *const u8 {
        self.base as *const u8
    }

    /// The complete memory span of the module image. This may include
    /// portions that are not committed.
    pub fn data(self) -> Option<&'static [u8]> {
        imp::module_data(self)
    }

    /// The memory span of the named section.
    ///
    /// PE section names are compared case-sensitively against the 8-byte
    /// short name. ELF images do not map their section table, so the well
    /// known names `.text`, `.rodata` and `.data` are resolved through the
    /// protection flags of the program segments; other names return `None`.
    pub fn section_data(self, name: &str) -> Option<&'static [u8]> {
        let data = imp::section_data(self, name);
        if data.is_none() {
            log::debug!("section {name:?} not found in module at {:p}", self.address());
        }
        data
    }

    /// The module's segments with their protection flags.
    pub fn segments(self) -> Vec<(&'static [u8], Protection)> {
        imp::segments(self)
    }
}

/// Returns the module for the current process's base executable.
pub fn get_process_module() -> Module {
    imp::process_module()
}

/// Returns the module with the given name, if it is loaded in the current
/// process.
pub fn get_module(name: &str) -> Option<Module> {
    let module = imp::module_by_name(name);
    if module.is_none() {
        log::debug!("module {name:?} not found");
    }
    module
}

/// Checks that `address` points at a valid module image and returns a
/// handle to it. A `size` bounds the header reads, preventing out-of-range
/// accesses when the allocation is small.
pub fn module_at(address: *const u8, size: Option<usize>) -> Option<Module> {
    imp::module_at(address, size)
}
