//! Aggregated refresh counters with a rolling average duration.

use std::time::Duration;

/// Read-only metrics snapshot.
#[derive(Clone, Debug, Default)]
pub struct RefreshMetrics {
    /// Every request submitted to the coordinator (including skips/drops).
    pub total: u64,
    /// Executions that completed successfully.
    pub succeeded: u64,
    /// Executions that failed (timeouts included).
    pub failed: u64,
    /// Of the failures, how many were timeouts.
    pub timed_out: u64,
    /// Requests skipped because the source was already refreshing.
    pub skipped: u64,
    /// Queued requests rejected by the queue bound.
    pub dropped: u64,
    /// Rolling average duration of settled executions, in milliseconds.
    pub avg_duration_ms: f64,
}

/// Mutable accumulator behind the coordinator's lock.
#[derive(Default)]
pub(crate) struct MetricsInner {
    snapshot: RefreshMetrics,
    settled: u64,
}

impl MetricsInner {
    pub fn record_submitted(&mut self) {
        self.snapshot.total += 1;
    }

    pub fn record_success(&mut self, elapsed: Duration) {
        self.snapshot.succeeded += 1;
        self.roll(elapsed);
    }

    pub fn record_failure(&mut self, elapsed: Duration, timed_out: bool) {
        self.snapshot.failed += 1;
        if timed_out {
            self.snapshot.timed_out += 1;
        }
        self.roll(elapsed);
    }

    pub fn record_skip(&mut self) {
        self.snapshot.skipped += 1;
    }

    pub fn record_drop(&mut self) {
        self.snapshot.dropped += 1;
    }

    pub fn snapshot(&self) -> RefreshMetrics {
        self.snapshot.clone()
    }

    /// Incremental mean: `avg += (x − avg) / n`.
    fn roll(&mut self, elapsed: Duration) {
        self.settled += 1;
        let x = elapsed.as_secs_f64() * 1000.0;
        let avg = self.snapshot.avg_duration_ms;
        self.snapshot.avg_duration_ms = avg + (x - avg) / self.settled as f64;
    }
}
