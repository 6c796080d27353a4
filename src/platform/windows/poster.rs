//! Keepalive delivery via PostMessageW.
//!
//! `MessagePoster` implements `EventSink`. Posting is asynchronous:
//! `PostMessageW` queues the message on the target window's thread and
//! returns immediately, so a hung installer UI never blocks the worker.
//! Unlike `SendInput`, posted messages reach only the target window and do
//! not touch the global input state.

use std::ffi::c_void;

use windows_sys::Win32::Foundation::{LPARAM, WPARAM};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    PostMessageW, WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP,
};

use crate::platform::{EventSink, KeepaliveEvent, PlatformError, WindowHandle};

/// `MK_LBUTTON` -- wParam flag for "left button is down".
const MK_LBUTTON: WPARAM = 0x0001;

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

/// Posts keepalive messages to a window.
///
/// Stateless: each `post()` call issues one or two `PostMessageW` calls.
pub struct MessagePoster;

impl MessagePoster {
    pub fn new() -> Self {
        MessagePoster
    }
}

impl Default for MessagePoster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MessagePoster {
    fn post(&self, window: WindowHandle, event: KeepaliveEvent) -> Result<(), PlatformError> {
        match event {
            KeepaliveEvent::KeyUp { vk } => post_message(window, WM_KEYUP, vk as WPARAM, 0),
            KeepaliveEvent::MouseClick => {
                post_message(window, WM_LBUTTONDOWN, MK_LBUTTON, 0)?;
                post_message(window, WM_LBUTTONUP, 0, 0)
            }
        }
    }
}

fn post_message(
    window: WindowHandle,
    msg: u32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> Result<(), PlatformError> {
    let hwnd = window.as_raw() as *mut c_void;
    let ok = unsafe { PostMessageW(hwnd, msg, w_param, l_param) };
    if ok == 0 {
        return Err(PlatformError::Other(format!(
            "PostMessageW({msg:#06x}) to {window:?} failed"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
