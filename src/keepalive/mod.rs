//! Keepalive timer: periodically posts an inert input event to a window.
//!
//! The setup host has no timers or background tasks, so a long-running
//! step would leave its wizard window idle. `Keepalive::arm()` starts a
//! single background thread that posts a `KeepaliveEvent` to the armed
//! window, then waits for the armed interval, until disarmed.
//!
//! Shared state is three atomics (target handle, interval, generation).
//! The worker re-reads them on every tick, so re-arming only updates the
//! target and interval. Disarming clears the target and bumps the
//! generation; the worker notices on its next check, so cancellation
//! latency is at most one interval. A worker left over from an earlier
//! generation exits on its next check even if a new target was armed in
//! the meantime, so at most one worker keeps posting.

mod ticker;

pub use ticker::{ThreadTicker, Ticker};

use std::sync::atomic::{AtomicIsize, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::platform::{EventSink, KeepaliveEvent, WindowHandle};

// ---------------------------------------------------------------------------
// Arm outcome
// ---------------------------------------------------------------------------

/// What a call to `Keepalive::arm` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// A new worker thread was started.
    Started,
    /// A worker was already running; only target and interval changed.
    Updated,
    /// The null handle was armed; the worker stops on its next check.
    Disarmed,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Shared {
    /// Raw target handle, 0 when disarmed.
    target: AtomicIsize,
    interval_ms: AtomicU64,
    generation: AtomicU64,
}

struct Worker {
    generation: u64,
    thread: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

/// One keepalive timer. Methods take `&self` so an instance can live in a
/// process-wide static.
pub struct Keepalive {
    event: KeepaliveEvent,
    /// Overrides the armed interval (the mouse variant ticks at a fixed rate).
    fixed_interval: Option<Duration>,
    sink: Arc<dyn EventSink>,
    ticker: Arc<dyn Ticker>,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Keepalive {
    pub fn new(event: KeepaliveEvent, sink: Arc<dyn EventSink>, ticker: Arc<dyn Ticker>) -> Self {
        Self {
            event,
            fixed_interval: None,
            sink,
            ticker,
            shared: Arc::new(Shared {
                target: AtomicIsize::new(0),
                interval_ms: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Ignores the interval given to `arm` and always waits `interval`.
    pub fn with_fixed_interval(mut self, interval: Duration) -> Self {
        self.fixed_interval = Some(interval);
        self
    }

    /// Points the timer at `window`, or disarms it when `window` is `None`.
    ///
    /// Starts a worker only if none is running for the current generation.
    pub fn arm(&self, window: Option<WindowHandle>, interval_ms: u32) -> ArmOutcome {
        let Some(window) = window else {
            self.disarm();
            return ArmOutcome::Disarmed;
        };

        self.shared
            .interval_ms
            .store(u64::from(interval_ms), Ordering::Release);
        self.shared.target.store(window.as_raw(), Ordering::Release);

        let mut slot = self.lock_worker();
        let generation = self.shared.generation.load(Ordering::Acquire);

        if let Some(worker) = slot.as_ref() {
            if worker.generation == generation && !worker.thread.is_finished() {
                log::debug!("keepalive: retargeted to {window:?} every {interval_ms}ms");
                return ArmOutcome::Updated;
            }
        }

        if self.fixed_interval.map_or(interval_ms == 0, |d| d.is_zero()) {
            log::warn!("keepalive: zero interval, events will be posted continuously");
        }

        let shared = Arc::clone(&self.shared);
        let sink = Arc::clone(&self.sink);
        let ticker = Arc::clone(&self.ticker);
        let event = self.event;
        let fixed_interval = self.fixed_interval;

        let thread = thread::spawn(move || {
            run_worker(&shared, generation, sink.as_ref(), ticker.as_ref(), event, fixed_interval)
        });

        log::info!("keepalive: started for {window:?} ({:?})", self.event);

        // A previous worker, if any, is detached here; it belongs to an older
        // generation and exits on its next check.
        *slot = Some(Worker { generation, thread });
        ArmOutcome::Started
    }

    /// Clears the target. The worker exits within one interval.
    pub fn disarm(&self) {
        // Hold the slot so a concurrent `arm` sees either the old or the new
        // generation, never a half-updated state.
        let _slot = self.lock_worker();
        self.shared.target.store(0, Ordering::Release);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        log::debug!("keepalive: disarmed");
    }

    /// True while the most recently started worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|w| !w.thread.is_finished())
    }

    /// Disarms and waits for the worker to exit.
    pub fn shutdown(&self) {
        self.disarm();
        let worker = self.lock_worker().take();
        if let Some(worker) = worker {
            if worker.thread.join().is_err() {
                log::warn!("keepalive: worker panicked");
            }
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        // The slot holds no invariant a panic could break.
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.disarm();
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

fn run_worker(
    shared: &Shared,
    generation: u64,
    sink: &dyn EventSink,
    ticker: &dyn Ticker,
    event: KeepaliveEvent,
    fixed_interval: Option<Duration>,
) {
    let mut posted: u64 = 0;

    while shared.generation.load(Ordering::Acquire) == generation {
        let Some(window) = WindowHandle::from_raw(shared.target.load(Ordering::Acquire)) else {
            break;
        };

        if let Err(e) = sink.post(window, event) {
            log::debug!("keepalive: post to {window:?} failed: {e}");
        }
        posted += 1;

        let interval = fixed_interval
            .unwrap_or_else(|| Duration::from_millis(shared.interval_ms.load(Ordering::Acquire)));
        ticker.wait(interval);
    }

    log::debug!("keepalive: worker exited after {posted} tick(s)");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
