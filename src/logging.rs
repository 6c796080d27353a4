//! Logger setup for the loaded module.
//!
//! The host process owns stderr, so output is only visible when the setup
//! program is started from a console. Default level is warn; override with
//! `RUST_LOG`, e.g. `RUST_LOG=installhelper=debug`.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the `env_logger` backend once per process.
///
/// Safe to call from every export; a logger installed by an embedding
/// Rust program takes precedence.
pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .format_timestamp_millis()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        log::debug!("logging: still alive");
    }
}
