//! Pacing between keepalive posts.

use std::thread;
use std::time::Duration;

/// Suspends the keepalive worker between two posts.
///
/// Injected so tests can run the worker loop without real delays.
pub trait Ticker: Send + Sync {
    fn wait(&self, interval: Duration);
}

/// Sleeps the worker thread. A zero interval yields instead.
pub struct ThreadTicker;

impl Ticker for ThreadTicker {
    fn wait(&self, interval: Duration) {
        if interval.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(interval);
        }
    }
}
