//! Module resolution through the dynamic linker.

use core::ffi::CStr;

use crate::protect::Protection;

use super::{elf, Module};

/// Runs `f` for every loaded object. Returning `false` stops the walk.
fn each_object(mut f: impl FnMut(&libc::dl_phdr_info) -> bool) {
    unsafe extern "C" fn callback(
        info: *mut libc::dl_phdr_info,
        _size: libc::size_t,
        data: *mut libc::c_void,
    ) -> libc::c_int {
        let f = &mut *(data as *mut &mut dyn FnMut(&libc::dl_phdr_info) -> bool);
        if f(&*info) {
            0
        } else {
            1
        }
    }

    let mut f: &mut dyn FnMut(&libc::dl_phdr_info) -> bool = &mut f;
    unsafe {
        libc::dl_iterate_phdr(Some(callback), &mut f as *mut _ as *mut libc::c_void);
    }
}

/// Runs `f` over the program headers of the object at `base`.
fn with_phdrs<R>(base: usize, f: impl FnOnce(&[libc::Elf64_Phdr]) -> R) -> Option<R> {
    let mut result = None;
    let mut f = Some(f);
    each_object(|info| {
        if info.dlpi_addr as usize != base {
            return true;
        }
        let phdrs = if info.dlpi_phdr.is_null() {
            &[][..]
        } else {
            // SAFETY: the linker guarantees dlpi_phdr points at dlpi_phnum
            // program headers for the lifetime of the callback.
            unsafe { core::slice::from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize) }
        };
        if let Some(f) = f.take() {
            result = Some(f(phdrs));
        }
        false
    });
    result
}

fn object_name(info: &libc::dl_phdr_info) -> Option<&CStr> {
    if info.dlpi_name.is_null() {
        return None;
    }
    // SAFETY: dlpi_name is a NUL terminated path owned by the linker.
    Some(unsafe { CStr::from_ptr(info.dlpi_name) })
}

pub(super) fn process_module() -> Module {
    let mut base = 0;
    each_object(|info| {
        // The first object reported is the executable itself.
        base = info.dlpi_addr as usize;
        false
    });
    Module::from_base(base)
}

pub(super) fn module_by_name(name: &str) -> Option<Module> {
    let mut found = None;
    each_object(|info| {
        let Some(path) = object_name(info).and_then(|path| path.to_str().ok()) else {
            return true;
        };
        let matches = path == name
            || path
                .rsplit('/')
                .next()
                .is_some_and(|file_name| file_name == name);
        if matches {
            found = Some(Module::from_base(info.dlpi_addr as usize));
            return false;
        }
        true
    });
    found
}

pub(super) fn module_at(address: *const u8, size: Option<usize>) -> Option<Module> {
    const IDENT_LEN: usize = 16;
    if address.is_null() || size.is_some_and(|size| size < IDENT_LEN) {
        return None;
    }
    // SAFETY: the caller vouches for `address` pointing at readable memory
    // of at least `size` bytes (or a mapped image when no size is given).
    let headers = unsafe { core::slice::from_raw_parts(address, IDENT_LEN) };
    if !elf::validate(headers) {
        return None;
    }
    Some(Module::from_base(address as usize))
}

fn flags_to_protection(p_flags: u32) -> Protection {
    let mut protection = Protection::empty();
    if p_flags & libc::PF_R != 0 {
        protection |= Protection::READ;
    }
    if p_flags & libc::PF_W != 0 {
        protection |= Protection::WRITE;
    }
    if p_flags & libc::PF_X != 0 {
        protection |= Protection::EXECUTE;
    }
    protection
}

/// The PT_LOAD envelope of the object: from the lowest to the highest
/// mapped virtual address, relative to the base.
pub(super) fn module_data(module: Module) -> Option<&'static [u8]> {
    let base = module.address() as usize;
    with_phdrs(base, |phdrs| {
        let mut lo = usize::MAX;
        let mut hi = 0usize;
        for phdr in phdrs {
            if phdr.p_type != libc::PT_LOAD {
                continue;
            }
            lo = lo.min(phdr.p_vaddr as usize);
            hi = hi.max(phdr.p_vaddr as usize + phdr.p_memsz as usize);
        }
        if lo > hi {
            return None;
        }
        // SAFETY: the range is mapped as part of the loaded image and the
        // image stays loaded for the process lifetime.
        Some(unsafe { core::slice::from_raw_parts((base + lo) as *const u8, hi - lo) })
    })?
}

pub(super) fn section_data(module: Module, name: &str) -> Option<&'static [u8]> {
    let (required, forbidden) = elf::section_protection(name)?;
    segments(module)
        .into_iter()
        .find(|(_, protection)| {
            protection.contains(required) && !protection.intersects(forbidden)
        })
        .map(|(data, _)| data)
}

pub(super) fn segments(module: Module) -> Vec<(&'static [u8], Protection)> {
    let base = module.address() as usize;
    with_phdrs(base, |phdrs| {
        phdrs
            .iter()
            .filter(|phdr| phdr.p_type == libc::PT_LOAD)
            .map(|phdr| {
                // SAFETY: PT_LOAD ranges are mapped for the process lifetime.
                let data = unsafe {
                    core::slice::from_raw_parts(
                        (base + phdr.p_vaddr as usize) as *const u8,
                        phdr.p_memsz as usize,
                    )
                };
                (data, flags_to_protection(phdr.p_flags))
            })
            .collect()
    })
    .unwrap_or_default()
}
