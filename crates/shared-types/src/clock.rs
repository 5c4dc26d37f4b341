//! # Clock Port
//!
//! Monotonic deadlines and wall-clock seconds behind one trait so timeout
//! handling and proof freshness can be driven by tests.

use parking_lot::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source for deadlines and freshness checks.
pub trait Clock: Send + Sync {
    /// Monotonic now.
    fn now(&self) -> Instant;

    /// Seconds since the Unix epoch.
    fn unix_now(&self) -> u64;
}

/// Production clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    offset: Duration,
    unix: u64,
}

impl ManualClock {
    /// Start at the given Unix time.
    pub fn new(unix_start: u64) -> Self {
        Self {
            base: Instant::now(),
            state: Mutex::new(ManualState {
                offset: Duration::ZERO,
                unix: unix_start,
            }),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.offset += by;
        state.unix += by.as_secs();
    }

    /// Set the wall clock without touching the monotonic one.
    pub fn set_unix(&self, unix: u64) {
        self.state.lock().unix = unix;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.state.lock().offset
    }

    fn unix_now(&self) -> u64 {
        self.state.lock().unix
    }
}
