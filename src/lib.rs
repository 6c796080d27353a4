//! installhelper -- native helpers for the setup program.
//!
//! The installer's scripting engine has no timers and mangles UTF-16 files,
//! so two jobs are delegated to this loadable module:
//!
//! - `keepalive`: a background worker posts an inert input event to the
//!   wizard window at a fixed interval so it is never considered idle.
//! - `patcher`: rewrites the scheduled-task XML generated by `schtasks.exe`
//!   (author, Users group principal, run level, battery and instance policy).
//!
//! The C-ABI entry points are in `ffi`; everything else is a regular Rust
//! API that the exports wrap.

pub mod config;
pub mod ffi;
pub mod keepalive;
pub mod logging;
pub mod patcher;
pub mod platform;

pub use config::{Config, ConfigError, KeepaliveConfig, PatchConfig};
pub use keepalive::{ArmOutcome, Keepalive, ThreadTicker, Ticker};
pub use patcher::{PatchError, PatchReport, Patcher};
pub use platform::{KeepaliveEvent, PlatformError, WindowHandle};
