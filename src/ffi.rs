//! C-ABI entry points called by the installer script.
//!
//! Declared on the script side as, for example:
//!
//! ```text
//! procedure keepalive(hwnd: HWND; ms: Cardinal); external 'keepalive@files:installhelper.dll cdecl';
//! procedure fix_file(path: String); external 'fix_file@files:installhelper.dll cdecl';
//! ```
//!
//! The host has no way to react to a failure, so nothing is returned: every
//! error is logged and absorbed here, and panics are caught before they can
//! unwind into foreign frames.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::Config;
use crate::keepalive::{Keepalive, ThreadTicker};
use crate::logging;
use crate::patcher::{PatchReport, Patcher};
use crate::platform::{self, KeepaliveEvent, WindowHandle};

static CONFIG: OnceLock<Config> = OnceLock::new();
static KEY_TIMER: OnceLock<Option<Keepalive>> = OnceLock::new();
static MOUSE_TIMER: OnceLock<Option<Keepalive>> = OnceLock::new();

fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

fn timer(slot: &'static OnceLock<Option<Keepalive>>, mouse: bool) -> Option<&'static Keepalive> {
    slot.get_or_init(|| {
        let sink = match platform::create_event_sink() {
            Ok(sink) => sink,
            Err(e) => {
                log::warn!("ffi: keepalive disabled: {e}");
                return None;
            }
        };
        let settings = &config().keepalive;
        let timer = if mouse {
            Keepalive::new(KeepaliveEvent::MouseClick, sink, Arc::new(ThreadTicker))
                .with_fixed_interval(Duration::from_millis(settings.mouse_interval_ms))
        } else {
            Keepalive::new(
                KeepaliveEvent::KeyUp {
                    vk: settings.key_code,
                },
                sink,
                Arc::new(ThreadTicker),
            )
        };
        Some(timer)
    })
    .as_ref()
}

/// Runs `f`, logging instead of unwinding if it panics.
fn guarded<F: FnOnce()>(name: &str, f: F) {
    logging::init();
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::error!("ffi: {name} panicked");
    }
}

// ---------------------------------------------------------------------------
// Keepalive
// ---------------------------------------------------------------------------

/// Posts `WM_KEYUP` to `hwnd` every `milliseconds` from a background
/// thread. A null `hwnd` stops it.
#[no_mangle]
pub extern "C" fn keepalive(hwnd: isize, milliseconds: u32) {
    guarded("keepalive", || {
        if let Some(timer) = timer(&KEY_TIMER, false) {
            let outcome = timer.arm(WindowHandle::from_raw(hwnd), milliseconds);
            log::debug!("ffi: keepalive({hwnd:#x}, {milliseconds}) -> {outcome:?}");
        }
    });
}

/// Clicks the left mouse button in `hwnd` at a fixed interval (2 s unless
/// configured otherwise). A null `hwnd` stops it.
#[no_mangle]
pub extern "C" fn keepalive_mouse(hwnd: isize) {
    guarded("keepalive_mouse", || {
        if let Some(timer) = timer(&MOUSE_TIMER, true) {
            let outcome = timer.arm(WindowHandle::from_raw(hwnd), 0);
            log::debug!("ffi: keepalive_mouse({hwnd:#x}) -> {outcome:?}");
        }
    });
}

// ---------------------------------------------------------------------------
// Task file
// ---------------------------------------------------------------------------

/// Rewrites the scheduled-task XML at `path` in place.
///
/// # Safety
///
/// `path` must be null or point to a NUL-terminated UTF-16 string.
#[no_mangle]
pub unsafe extern "C" fn fix_file(path: *const u16) {
    guarded("fix_file", || {
        let Some(path) = (unsafe { wide_to_path(path) }) else {
            log::warn!("ffi: fix_file called with a null path");
            return;
        };
        fix_file_at(&path, config());
    });
}

/// Same as `fix_file`, reading settings from the TOML file at `config_path`.
///
/// # Safety
///
/// Both arguments must be null or point to NUL-terminated UTF-16 strings.
#[no_mangle]
pub unsafe extern "C" fn fix_file_with_config(path: *const u16, config_path: *const u16) {
    guarded("fix_file_with_config", || {
        let Some(path) = (unsafe { wide_to_path(path) }) else {
            log::warn!("ffi: fix_file_with_config called with a null path");
            return;
        };
        let config = match unsafe { wide_to_path(config_path) }.map(|p| Config::load(&p)) {
            Some(Ok(config)) => config,
            Some(Err(e)) => {
                log::warn!("ffi: {e}; using defaults");
                Config::default()
            }
            None => config().clone(),
        };
        fix_file_at(&path, &config);
    });
}

/// Patches `path`, logging the outcome. Returns the report on success.
pub fn fix_file_at(path: &Path, config: &Config) -> Option<PatchReport> {
    match Patcher::new(config.patch.clone()).patch(path) {
        Ok(report) => Some(report),
        Err(e) if e.is_not_found() => {
            log::info!("ffi: fix_file: {e}");
            None
        }
        Err(e) => {
            log::warn!("ffi: fix_file: {e}");
            None
        }
    }
}

/// Reads a NUL-terminated UTF-16 string. Returns `None` for null.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated UTF-16 string.
unsafe fn wide_to_path(ptr: *const u16) -> Option<PathBuf> {
    if ptr.is_null() {
        return None;
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    let wide = std::slice::from_raw_parts(ptr, len);

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::ffi::OsStringExt;
        Some(PathBuf::from(std::ffi::OsString::from_wide(wide)))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Some(PathBuf::from(String::from_utf16_lossy(wide)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patcher::{encode, TextEncoding};

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(Some(0)).collect()
    }

    #[test]
    fn wide_to_path_reads_until_nul() {
        let buf = wide("C:\\Windows\\System32\\Tasks\\WinCompose");
        let path = unsafe { wide_to_path(buf.as_ptr()) }.unwrap();
        assert_eq!(path, PathBuf::from("C:\\Windows\\System32\\Tasks\\WinCompose"));
    }

    #[test]
    fn wide_to_path_null_is_none() {
        assert!(unsafe { wide_to_path(std::ptr::null()) }.is_none());
    }

    #[test]
    fn fix_file_export_patches_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.xml");
        let text = "<Author>someone</Author>\r\n<StopOnIdleEnd>true</StopOnIdleEnd>";
        std::fs::write(&path, encode(text, TextEncoding::Utf16Le, true)).unwrap();

        let arg = wide(path.to_str().unwrap());
        unsafe { fix_file(arg.as_ptr()) };

        let bytes = std::fs::read(&path).unwrap();
        let expected = encode(
            "<Author>Sam Hocevar</Author>\r\n<StopOnIdleEnd>false</StopOnIdleEnd>",
            TextEncoding::Utf16Le,
            true,
        );
        assert_eq!(bytes, expected);
    }

    #[test]
    fn fix_file_export_ignores_missing_and_null_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.xml");
        let arg = wide(missing.to_str().unwrap());

        unsafe {
            fix_file(arg.as_ptr());
            fix_file(std::ptr::null());
        }
        assert!(!missing.exists());
    }

    #[test]
    fn explicit_config_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.xml");
        let config_path = dir.path().join("helper.toml");
        std::fs::write(&config_path, "[patch]\nauthor = \"Setup\"\n").unwrap();
        std::fs::write(&path, encode("<Author></Author>", TextEncoding::Utf16Le, true)).unwrap();

        let arg = wide(path.to_str().unwrap());
        let config_arg = wide(config_path.to_str().unwrap());
        unsafe { fix_file_with_config(arg.as_ptr(), config_arg.as_ptr()) };

        assert_eq!(
            std::fs::read(&path).unwrap(),
            encode("<Author>Setup</Author>", TextEncoding::Utf16Le, true)
        );
    }

    #[test]
    fn fix_file_at_reports_missing_file_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(fix_file_at(&dir.path().join("absent.xml"), &Config::default()).is_none());
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn keepalive_exports_are_harmless_without_windows() {
        keepalive(0x1234, 10);
        keepalive(0, 10);
        keepalive_mouse(0x1234);
        keepalive_mouse(0);
        assert!(timer(&KEY_TIMER, false).is_none());
    }
}
