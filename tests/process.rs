#![cfg(target_os = "linux")]

use sigscan::process;

#[test]
fn resolves_the_process_module() {
    let module = process::get_process_module();
    let data = module.data().expect("process image span");
    assert!(!data.is_empty());

    let text = module.section_data(".text").expect("executable segment");
    assert!(!text.is_empty());
    let image = data.as_ptr() as usize..data.as_ptr() as usize + data.len();
    assert!(image.contains(&(text.as_ptr() as usize)));

    // Unmapped section names pass through as "not found".
    assert!(module.section_data(".comment").is_none());
    assert!(!module.segments().is_empty());
}

#[test]
fn missing_modules_resolve_to_none() {
    assert!(process::get_module("libdoesnotexist.so.999").is_none());
}

#[test]
fn module_at_validates_headers() {
    let mut image = [0u8; 64];
    assert!(process::module_at(image.as_ptr(), Some(image.len())).is_none());
    image[..4].copy_from_slice(b"\x7fELF");
    assert!(process::module_at(image.as_ptr(), Some(image.len())).is_some());
    assert!(process::module_at(core::ptr::null(), None).is_none());
}
