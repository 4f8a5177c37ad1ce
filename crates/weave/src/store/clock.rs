//! Time sources for polling.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Virtual time clock for deterministic tests.
///
/// Time only advances when explicitly requested via `advance_by()`.
#[derive(Debug, Default)]
pub struct TestClock {
    current_time_ms: Cell<u64>,
}

impl TestClock {
    /// Create a new TestClock starting at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_by(&self, ms: u64) {
        self.current_time_ms.set(self.current_time_ms.get() + ms);
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.current_time_ms.get()
    }
}
