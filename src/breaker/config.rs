//! Circuit-breaker thresholds and backoff shape.

use std::time::Duration;

/// Configuration shared by all per-source breakers.
///
/// The reset timeout for the n-th opening in a failure cycle is
/// `min(base_timeout × multiplier^(n−1), max_timeout)`, with ± `jitter`
/// fraction of randomization, clamped back into `[base_timeout, max_timeout]`.
#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Consecutive failures that trip Closed → Open.
    pub failure_threshold: u32,
    /// Reset timeout for the first opening.
    pub base_timeout: Duration,
    /// Upper bound for the reset timeout.
    pub max_timeout: Duration,
    /// Multiplicative growth factor per opening (`>= 1.0`).
    pub multiplier: f64,
    /// Fraction of random jitter (`0.2` = ±20%) to desynchronize retries
    /// across sources.
    pub jitter: f64,
    /// A success arriving more than this long after the previous success
    /// halves the opening counter instead of resetting it, so a flaky
    /// source's history is not instantly forgotten.
    pub decay_after: Duration,
    /// Bounded diagnostic history of backoff computations.
    pub history_limit: usize,
}

impl Default for BreakerConfig {
    /// `failure_threshold = 4`, `base_timeout = 30s`, `max_timeout = 15min`,
    /// `multiplier = 2.0`, `jitter = 0.2`, `decay_after = 5min`,
    /// `history_limit = 10`.
    fn default() -> Self {
        Self {
            failure_threshold: 4,
            base_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(15 * 60),
            multiplier: 2.0,
            jitter: 0.2,
            decay_after: Duration::from_secs(5 * 60),
            history_limit: 10,
        }
    }
}
