//! Portable stand-ins for OS capabilities that only exist on Windows.
//!
//! Also used by tests to pin the group name without touching the OS.

use super::{AccountLookup, FsRedirection};

/// No redirector to disable.
pub struct NoRedirection;

impl FsRedirection for NoRedirection {
    fn disable(&self) -> Option<usize> {
        None
    }

    fn revert(&self, _previous: usize) {}
}

/// Returns a fixed answer (or none) for the Users group lookup.
pub struct StaticAccountLookup(pub Option<String>);

impl AccountLookup for StaticAccountLookup {
    fn users_group(&self) -> Option<String> {
        self.0.clone()
    }
}
