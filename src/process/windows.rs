//! Module resolution through the Win32 loader.

use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;

use crate::protect::Protection;

use super::{pe, Module};

/// The PE headers live in the first page of the mapped image.
const HEADER_LEN: usize = 0x1000;

fn headers(module: Module) -> &'static [u8] {
    // SAFETY: the loader maps at least one page of headers at the image
    // base, and the image stays loaded for the process lifetime.
    unsafe { core::slice::from_raw_parts(module.address(), HEADER_LEN) }
}

pub(super) fn process_module() -> Module {
    // SAFETY: a null name returns the handle of the process executable.
    let handle = unsafe { GetModuleHandleW(core::ptr::null()) };
    Module::from_base(handle as usize)
}

pub(super) fn module_by_name(name: &str) -> Option<Module> {
    let wide: Vec<u16> = name.encode_utf16().chain([0]).collect();
    // SAFETY: `wide` is NUL terminated and lives across the call.
    let handle = unsafe { GetModuleHandleW(wide.as_ptr()) };
    if handle.is_null() {
        return None;
    }
    Some(Module::from_base(handle as usize))
}

pub(super) fn module_at(address: *const u8, size: Option<usize>) -> Option<Module> {
    if address.is_null() {
        return None;
    }
    let len = size.unwrap_or(HEADER_LEN).min(HEADER_LEN);
    // SAFETY: the caller vouches for `address` pointing at readable memory
    // of at least `len` bytes.
    let headers = unsafe { core::slice::from_raw_parts(address, len) };
    if !pe::validate(headers) {
        return None;
    }
    Some(Module::from_base(address as usize))
}

pub(super) fn module_data(module: Module) -> Option<&'static [u8]> {
    let size = pe::size_of_image(headers(module))?;
    // SAFETY: the loader reserves SizeOfImage bytes at the image base.
    Some(unsafe { core::slice::from_raw_parts(module.address(), size) })
}

pub(super) fn section_data(module: Module, name: &str) -> Option<&'static [u8]> {
    let (virtual_address, virtual_size) = pe::find_section(headers(module), name)?;
    // SAFETY: section ranges lie within the image reservation.
    Some(unsafe {
        core::slice::from_raw_parts(module.address().add(virtual_address), virtual_size)
    })
}

pub(super) fn segments(module: Module) -> Vec<(&'static [u8], Protection)> {
    pe::section_spans(headers(module))
        .into_iter()
        .map(|(virtual_address, virtual_size, protection)| {
            // SAFETY: section ranges lie within the image reservation.
            let data = unsafe {
                core::slice::from_raw_parts(module.address().add(virtual_address), virtual_size)
            };
            (data, protection)
        })
        .collect()
}
