//! Display name of the built-in Users group (S-1-5-32-545).
//!
//! The name is localised ("BUILTIN\Users", "VORDEFINIERT\Benutzer", ...),
//! so it has to be asked from the OS rather than hardcoded in the task file.

use std::ffi::c_void;

use super::symbols::resolve;
use crate::platform::AccountLookup;

type LookupAccountSidFn = unsafe extern "system" fn(
    system_name: *const u16,
    sid: *mut c_void,
    name: *mut u16,
    name_len: *mut u32,
    domain: *mut u16,
    domain_len: *mut u32,
    sid_use: *mut i32,
) -> i32;

/// Binary SID S-1-5-32-545.
const USERS_SID: [u8; 16] = [
    1, // Revision
    2, // SubAuthorityCount
    0, 0, 0, 0, 0, 5, // IdentifierAuthority = SECURITY_NT_AUTHORITY
    32, 0, 0, 0, // SECURITY_BUILTIN_DOMAIN_RID
    0x21, 0x02, 0, 0, // DOMAIN_ALIAS_RID_USERS (545)
];

const NAME_CAPACITY: usize = 128;

pub struct SidLookup {
    lookup: Option<LookupAccountSidFn>,
}

impl SidLookup {
    pub fn new() -> Self {
        let lookup = resolve("advapi32.dll", b"LookupAccountSidW\0")
            .map(|p| unsafe { std::mem::transmute::<*const c_void, LookupAccountSidFn>(p) });
        Self { lookup }
    }
}

impl Default for SidLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountLookup for SidLookup {
    fn users_group(&self) -> Option<String> {
        let lookup = self.lookup?;

        let mut sid = USERS_SID;
        let mut name = [0u16; NAME_CAPACITY];
        let mut domain = [0u16; NAME_CAPACITY];
        let mut name_len = NAME_CAPACITY as u32;
        let mut domain_len = NAME_CAPACITY as u32;
        let mut sid_use = 0i32;

        let ok = unsafe {
            lookup(
                std::ptr::null(),
                sid.as_mut_ptr().cast(),
                name.as_mut_ptr(),
                &mut name_len,
                domain.as_mut_ptr(),
                &mut domain_len,
                &mut sid_use,
            )
        };
        if ok == 0 {
            log::debug!("platform: LookupAccountSidW failed for S-1-5-32-545");
            return None;
        }

        // On success the lengths exclude the terminating NUL.
        let name = String::from_utf16_lossy(&name[..name_len as usize]);
        let domain = String::from_utf16_lossy(&domain[..domain_len as usize]);
        if name.is_empty() {
            return None;
        }
        let domain = if domain.is_empty() { "BUILTIN".to_string() } else { domain };
        Some(format!("{domain}\\{name}"))
    }
}
