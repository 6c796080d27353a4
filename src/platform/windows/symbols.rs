//! Runtime lookup of optional system exports.

use std::ffi::c_void;

use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress, LoadLibraryW};

/// Returns the address of `symbol` (NUL-terminated ANSI name) in `module`,
/// loading the module if the process has not done so yet.
///
/// The returned pointer must be transmuted to the export's real signature.
pub fn resolve(module: &str, symbol: &[u8]) -> Option<*const c_void> {
    debug_assert_eq!(symbol.last(), Some(&0), "symbol name must be NUL-terminated");

    let wide: Vec<u16> = module.encode_utf16().chain(Some(0)).collect();

    let handle = unsafe {
        let loaded = GetModuleHandleW(wide.as_ptr());
        if loaded.is_null() {
            LoadLibraryW(wide.as_ptr())
        } else {
            loaded
        }
    };
    if handle.is_null() {
        log::debug!("platform: {module} is not available");
        return None;
    }

    let proc = unsafe { GetProcAddress(handle, symbol.as_ptr()) };
    match proc {
        Some(f) => Some(f as *const c_void),
        None => {
            log::debug!(
                "platform: {} not exported by {module}",
                String::from_utf8_lossy(&symbol[..symbol.len() - 1])
            );
            None
        }
    }
}
