//! WOW64 file-system redirection toggle.
//!
//! A 32-bit process on 64-bit Windows sees `%windir%\System32` mapped to
//! `SysWOW64`. The scheduled-task files live under the real System32, so
//! the patcher disables redirection for the duration of a call. Both
//! exports are resolved at runtime; they are absent on 32-bit Windows.

use std::ffi::c_void;

use super::symbols::resolve;
use crate::platform::FsRedirection;

type DisableFn = unsafe extern "system" fn(old_value: *mut *mut c_void) -> i32;
type RevertFn = unsafe extern "system" fn(old_value: *mut c_void) -> i32;

pub struct Wow64Redirection {
    disable: Option<DisableFn>,
    revert: Option<RevertFn>,
}

impl Wow64Redirection {
    pub fn new() -> Self {
        let disable = resolve("kernel32.dll", b"Wow64DisableWow64FsRedirection\0")
            .map(|p| unsafe { std::mem::transmute::<*const c_void, DisableFn>(p) });
        let revert = resolve("kernel32.dll", b"Wow64RevertWow64FsRedirection\0")
            .map(|p| unsafe { std::mem::transmute::<*const c_void, RevertFn>(p) });
        Self { disable, revert }
    }
}

impl Default for Wow64Redirection {
    fn default() -> Self {
        Self::new()
    }
}

impl FsRedirection for Wow64Redirection {
    fn disable(&self) -> Option<usize> {
        let disable = self.disable?;
        let mut old_value: *mut c_void = std::ptr::null_mut();
        if unsafe { disable(&mut old_value) } == 0 {
            // Fails with ERROR_INVALID_FUNCTION in 64-bit processes.
            log::debug!("platform: Wow64DisableWow64FsRedirection refused");
            return None;
        }
        Some(old_value as usize)
    }

    fn revert(&self, previous: usize) {
        if let Some(revert) = self.revert {
            if unsafe { revert(previous as *mut c_void) } == 0 {
                log::warn!("platform: Wow64RevertWow64FsRedirection failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Disable/revert must pair up cleanly whatever the process bitness.
    #[test]
    fn default_resolves_like_new() {
        let (default, new) = (Wow64Redirection::default(), Wow64Redirection::new());
        assert_eq!(default.disable.is_some(), new.disable.is_some());
        assert_eq!(default.revert.is_some(), new.revert.is_some());
    }

    #[test]
    fn disable_then_revert() {
        let redirection = Wow64Redirection::new();
        if let Some(previous) = redirection.disable() {
            redirection.revert(previous);
        }
    }
}
