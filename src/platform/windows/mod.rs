//! Windows platform backend: PostMessageW delivery, WOW64 redirection,
//! built-in account lookup.
//!
//! The redirection and account functions are resolved at runtime with
//! `GetProcAddress` so the module still loads on systems that lack them;
//! a missing export degrades to the portable behaviour.

mod account;
mod poster;
mod redirection;
mod symbols;

pub use account::SidLookup;
pub use poster::MessagePoster;
pub use redirection::Wow64Redirection;
