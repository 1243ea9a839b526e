//! Breaker state and status types.

use std::time::Duration;

/// Circuit state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation; requests pass through.
    Closed,
    /// Source assumed down; requests fail fast until `next_attempt_at`.
    Open,
    /// Probing: the next attempt decides Closed or Open.
    HalfOpen,
}

impl BreakerState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// One recorded backoff computation (diagnostics).
#[derive(Clone, Copy, Debug)]
pub struct BackoffRecord {
    /// When the opening happened (ms epoch).
    pub at_ms: u64,
    /// Opening level the timeout was derived from (0-based exponent).
    pub level: u32,
    /// The computed reset timeout.
    pub timeout: Duration,
}

/// Read-only breaker status for display and diagnostics.
#[derive(Clone, Debug)]
pub struct BreakerStatus {
    /// Current state.
    pub state: BreakerState,
    /// Failures in the current cycle.
    pub failure_count: u32,
    /// Openings in the current failure cycle (decays on recovery).
    pub consecutive_openings: u32,
    /// The current backoff, bounded by `[base_timeout, max_timeout]`.
    pub reset_timeout: Duration,
    /// Time until the next attempt is allowed (`None` unless Open).
    pub retry_after: Option<Duration>,
    /// Last backoff computations, oldest first (bounded).
    pub history: Vec<BackoffRecord>,
}
