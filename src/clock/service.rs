//! # Wall-clock and monotonic time source.
//!
//! [`ClockService`] is the single source of truth for "now". Wall time feeds
//! schedule arithmetic (absolute fire times); monotonic time measures elapsed
//! durations and is never affected by wall-clock changes.
//!
//! Anything that needs a *testable* timeline takes millisecond timestamps as
//! parameters instead of reading this service directly (see the breaker and
//! the pure alignment math) — the service is only consulted at call sites.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Reconciled time source shared across the runtime.
#[derive(Clone, Debug, Default)]
pub struct ClockService;

impl ClockService {
    /// Creates a new clock service.
    pub fn new() -> Self {
        Self
    }

    /// Current wall-clock time in milliseconds since the Unix epoch.
    ///
    /// A system clock set before the epoch reads as 0 rather than panicking.
    pub fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
            .unwrap_or(0)
    }

    /// Monotonically increasing reading for elapsed-time measurement.
    pub fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_is_past_2020() {
        let clock = ClockService::new();
        assert!(clock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn monotonic_never_decreases() {
        let clock = ClockService::new();
        let a = clock.monotonic();
        let b = clock.monotonic();
        assert!(b >= a);
    }
}
