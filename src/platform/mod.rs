//! Platform abstraction layer.
//!
//! Defines the OS seams used by the keepalive worker and the task-file
//! patcher: `EventSink` (post a synthetic input event to a window),
//! `FsRedirection` (the WOW64 file-system redirector) and `AccountLookup`
//! (well-known SID to display name). The Windows backend lives in
//! `windows`; every other target gets the portable fallbacks in `fallback`.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

mod fallback;
#[cfg(target_os = "windows")]
mod windows;

pub use fallback::{NoRedirection, StaticAccountLookup};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlatformError {
    /// The capability does not exist on this OS or could not be resolved.
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Window handle
// ---------------------------------------------------------------------------

/// A non-null native window handle.
///
/// Stored as `isize` so it is `Send`; the null handle is represented by
/// `Option::None` at every API boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(isize);

impl WindowHandle {
    /// Wraps a raw handle value. Returns `None` for the null handle.
    pub fn from_raw(raw: isize) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn as_raw(self) -> isize {
        self.0
    }
}

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WindowHandle({:#x})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Keepalive events
// ---------------------------------------------------------------------------

/// Synthetic input posted to the target window on every keepalive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveEvent {
    /// `WM_KEYUP` for the given virtual key. The default key is 0x88, which
    /// Windows documents as unassigned, so no control reacts to it.
    KeyUp { vk: u16 },
    /// `WM_LBUTTONDOWN` immediately followed by `WM_LBUTTONUP`.
    MouseClick,
}

/// Virtual key code documented as "unassigned" in winuser.h.
pub const UNASSIGNED_VK: u16 = 0x88;

impl Default for KeepaliveEvent {
    fn default() -> Self {
        KeepaliveEvent::KeyUp { vk: UNASSIGNED_VK }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Delivers keepalive events to a window owned by another component.
///
/// Posting is fire-and-forget: an `Err` only means the OS refused to queue
/// the message, not that the window handled it.
pub trait EventSink: Send + Sync {
    fn post(&self, window: WindowHandle, event: KeepaliveEvent) -> Result<(), PlatformError>;
}

/// Toggle for the 32-bit-on-64-bit file-system redirector.
pub trait FsRedirection {
    /// Disables redirection for the calling thread.
    ///
    /// Returns the opaque previous state to hand back to `revert`, or `None`
    /// when the capability is absent (nothing to restore).
    fn disable(&self) -> Option<usize>;

    fn revert(&self, previous: usize);
}

/// Resolves the display name of the local built-in "Users" group.
pub trait AccountLookup {
    /// Returns `DOMAIN\name` for SID S-1-5-32-545, or `None` when the lookup
    /// facility is missing or fails.
    fn users_group(&self) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// Returns the event sink for the current OS.
#[cfg(target_os = "windows")]
pub fn create_event_sink() -> Result<Arc<dyn EventSink>, PlatformError> {
    Ok(Arc::new(windows::MessagePoster::new()))
}

/// Returns the event sink for the current OS.
#[cfg(not(target_os = "windows"))]
pub fn create_event_sink() -> Result<Arc<dyn EventSink>, PlatformError> {
    Err(PlatformError::Unavailable(
        "posting window messages requires Windows".into(),
    ))
}

/// Returns the file-system redirection toggle for the current OS.
#[cfg(target_os = "windows")]
pub fn fs_redirection() -> Box<dyn FsRedirection> {
    Box::new(windows::Wow64Redirection::new())
}

/// Returns the file-system redirection toggle for the current OS.
#[cfg(not(target_os = "windows"))]
pub fn fs_redirection() -> Box<dyn FsRedirection> {
    Box::new(NoRedirection)
}

/// Returns the account lookup for the current OS.
#[cfg(target_os = "windows")]
pub fn account_lookup() -> Box<dyn AccountLookup> {
    Box::new(windows::SidLookup::new())
}

/// Returns the account lookup for the current OS.
#[cfg(not(target_os = "windows"))]
pub fn account_lookup() -> Box<dyn AccountLookup> {
    Box::new(StaticAccountLookup(None))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
