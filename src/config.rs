//! # Global runtime configuration.
//!
//! Provides [`RefreshConfig`] — centralized settings for the refresh runtime.
//!
//! Every threshold the scheduling engine relies on lives here so that hosts
//! can tune them; the defaults are the values the engine was designed around.
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no global semaphore created)
//! - `default_timeout = 0s` → no per-refresh timeout

use std::time::Duration;

use crate::breaker::BreakerConfig;
use crate::clock::MonitorConfig;

/// Global configuration for the refresh runtime.
///
/// Defines:
/// - **Interval validation**: accepted per-source interval bounds
/// - **Failure policy**: consecutive-failure budget before a source is dropped
/// - **Concurrency limits**: global refresh parallelism and per-source queues
/// - **Recovery behavior**: catch-up stagger, overdue sweep, offline debounce
/// - **Teardown**: bounded wait for in-flight refreshes
///
/// Component-level knobs are nested: [`BreakerConfig`] for the circuit
/// breaker, [`MonitorConfig`] for the clock monitor.
#[derive(Clone, Debug)]
pub struct RefreshConfig {
    /// Smallest accepted refresh interval.
    pub min_interval: Duration,

    /// Largest accepted refresh interval.
    pub max_interval: Duration,

    /// Floor applied whenever next-fire arithmetic yields a time in the past:
    /// the schedule is corrected to `now + minimal_delay`.
    pub minimal_delay: Duration,

    /// Consecutive (non-network) failures after which a source is
    /// auto-unscheduled. Fatal: the host must re-register the source.
    pub max_consecutive_failures: u32,

    /// Maximum number of refreshes in flight at once across all sources.
    ///
    /// - `0` = unlimited (no semaphore)
    /// - `n > 0` = at most `n` concurrent refreshes
    pub max_concurrent: usize,

    /// Per-source pending-request queue bound. When full, the oldest queued
    /// entry is rejected to make room (back-pressure, not unbounded growth).
    pub queue_capacity: usize,

    /// Default per-refresh timeout (`0s` = no timeout).
    pub default_timeout: Duration,

    /// Upper bound of the jittered delay applied to an overdue source so a
    /// burst of overdue sources does not fire in the same tick.
    pub overdue_jitter_max: Duration,

    /// Upper bound of the jittered delay for a source that has never been
    /// refreshed (kept tight so first refreshes feel immediate).
    pub first_fire_jitter_max: Duration,

    /// Cadence of the periodic overdue sweep (safety net against lost timers).
    pub sweep_interval: Duration,

    /// A source only qualifies for the sweep once it is overdue by more than
    /// this buffer.
    pub sweep_overdue_buffer: Duration,

    /// Maximum sources triggered per sweep pass.
    pub sweep_max_concurrent: usize,

    /// A source only joins the online catch-up pass when overdue by more
    /// than this buffer.
    pub catchup_overdue_buffer: Duration,

    /// Hard cap on the inter-source stagger delay during catch-up.
    pub catchup_stagger_cap: Duration,

    /// Total stagger budget spread across overdue sources during catch-up:
    /// per-source delay is `min(cap, budget / overdue_count)`.
    pub catchup_stagger_budget: Duration,

    /// Debounce applied before reacting to an offline transition, so rapid
    /// online/offline flapping collapses into one transition.
    pub offline_debounce: Duration,

    /// Maximum time `destroy()` waits for in-flight refreshes to settle.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Circuit-breaker thresholds, shared by all per-source breakers.
    pub breaker: BreakerConfig,

    /// Clock-monitor thresholds (tick cadence, jump/wake/drift detection).
    pub monitor: MonitorConfig,
}

impl Default for RefreshConfig {
    /// Provides the defaults the engine was designed around:
    /// - intervals validated to `[10s, 24h]`, stale times clamped by `100ms`
    /// - `max_consecutive_failures = 10` (then fatal unschedule)
    /// - `max_concurrent = 10`, `queue_capacity = 100`, `default_timeout = 30s`
    /// - sweep every `30s` for sources overdue by more than `60s`, max 2 at once
    /// - catch-up stagger `min(5s, 30s / overdue_count)` after a `5s` buffer
    /// - offline debounce `750ms`, teardown grace `5s`
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(24 * 60 * 60),
            minimal_delay: Duration::from_millis(100),
            max_consecutive_failures: 10,
            max_concurrent: 10,
            queue_capacity: 100,
            default_timeout: Duration::from_secs(30),
            overdue_jitter_max: Duration::from_secs(2),
            first_fire_jitter_max: Duration::from_millis(90),
            sweep_interval: Duration::from_secs(30),
            sweep_overdue_buffer: Duration::from_secs(60),
            sweep_max_concurrent: 2,
            catchup_overdue_buffer: Duration::from_secs(5),
            catchup_stagger_cap: Duration::from_secs(5),
            catchup_stagger_budget: Duration::from_secs(30),
            offline_debounce: Duration::from_millis(750),
            grace: Duration::from_secs(5),
            bus_capacity: 1024,
            breaker: BreakerConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl RefreshConfig {
    /// Returns the global concurrency limit as an `Option`.
    ///
    /// - `None` → unlimited (no semaphore)
    /// - `Some(n)` → at most `n` concurrent refreshes
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns the default per-refresh timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → timeout applied per refresh
    #[inline]
    pub fn refresh_timeout(&self) -> Option<Duration> {
        if self.default_timeout == Duration::ZERO {
            None
        } else {
            Some(self.default_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}
