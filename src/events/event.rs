//! # Runtime events emitted by the refresh engine.
//!
//! The [`EventKind`] enum classifies events across five categories:
//! - **Refresh lifecycle**: execution flow per source (starting, completed,
//!   failed, timed out, skipped, queue back-pressure)
//! - **Schedule management**: sources entering/leaving the schedule,
//!   including fatal exhaustion
//! - **Circuit breaker**: per-source state transitions
//! - **Environment**: network transitions, catch-up passes, sweep ticks, and
//!   clock anomalies
//! - **Teardown**: destroy flow and grace accounting
//!
//! The [`Event`] struct carries metadata such as timestamps, source id,
//! reasons, delays and clock deltas.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore exact order when events are delivered
//! out of order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Refresh lifecycle ===
    /// A refresh attempt is starting.
    ///
    /// Sets: `source`, `attempt`, `at`, `seq`.
    RefreshStarting,

    /// A refresh attempt completed successfully.
    ///
    /// Sets: `source`, `attempt`, `at`, `seq`.
    RefreshCompleted,

    /// A refresh attempt failed.
    ///
    /// Sets: `source`, `attempt`, `reason`, `at`, `seq`.
    RefreshFailed,

    /// A refresh attempt exceeded its timeout (always followed by
    /// `RefreshFailed`).
    ///
    /// Sets: `source`, `timeout_ms`, `at`, `seq`.
    RefreshTimedOut,

    /// A trigger was skipped because the source was already refreshing.
    ///
    /// Sets: `source`, `reason`, `at`, `seq`.
    RefreshSkipped,

    /// The oldest queued request for a source was dropped to bound the queue.
    ///
    /// Sets: `source`, `reason`, `at`, `seq`.
    QueueDropped,

    // === Schedule management ===
    /// A source entered (or re-entered) the schedule.
    ///
    /// Sets: `source`, `delay_ms` (interval), `at`, `seq`.
    SourceScheduled,

    /// A source left the schedule (host request or teardown).
    ///
    /// Sets: `source`, `at`, `seq`.
    SourceUnscheduled,

    /// A source exhausted its consecutive-failure budget and was removed.
    /// Fatal: the host must re-register it explicitly.
    ///
    /// Sets: `source`, `attempt` (failure count), `reason`, `at`, `seq`.
    SourceExhausted,

    // === Circuit breaker ===
    /// A per-source breaker transitioned to Open.
    ///
    /// Sets: `source`, `delay_ms` (reset timeout), `at`, `seq`.
    CircuitOpened,

    /// A per-source breaker transitioned to HalfOpen (probing).
    ///
    /// Sets: `source`, `at`, `seq`.
    CircuitHalfOpened,

    /// A per-source breaker transitioned to Closed.
    ///
    /// Sets: `source`, `at`, `seq`.
    CircuitClosed,

    // === Environment ===
    /// The host reported the network offline (post-debounce).
    ///
    /// Sets: `at`, `seq`.
    NetworkOffline,

    /// The host reported the network online.
    ///
    /// Sets: `at`, `seq`.
    NetworkOnline,

    /// A staggered catch-up pass over overdue sources started.
    ///
    /// Sets: `attempt` (overdue count), `delay_ms` (stagger), `reason`,
    /// `at`, `seq`.
    CatchUpStarted,

    /// The periodic overdue sweep triggered a source.
    ///
    /// Sets: `source`, `at`, `seq`.
    SweepTriggered,

    /// Wall clock jumped forward past the detection threshold.
    ///
    /// Sets: `delta_ms`, `at`, `seq`.
    ClockJumpForward,

    /// Wall clock jumped backward past the detection threshold.
    ///
    /// Sets: `delta_ms`, `at`, `seq`.
    ClockJumpBackward,

    /// Monotonic gap between ticks exceeded the wake threshold (system
    /// slept and resumed).
    ///
    /// Sets: `delta_ms`, `at`, `seq`.
    SystemWake,

    /// The resolved timezone name changed since the previous tick.
    ///
    /// Sets: `reason` (new zone), `at`, `seq`.
    TimezoneChanged,

    /// The UTC offset changed while the timezone name did not (DST edge).
    ///
    /// Sets: `delta_ms` (offset change), `at`, `seq`.
    DstChanged,

    /// Sub-threshold wall/monotonic divergence. Informational only.
    ///
    /// Sets: `delta_ms`, `at`, `seq`.
    ClockDrift,

    // === Teardown ===
    /// Teardown requested (host called destroy or a shutdown signal fired).
    ///
    /// Sets: `at`, `seq`.
    DestroyRequested,

    /// All in-flight refreshes settled within the configured grace.
    ///
    /// Sets: `at`, `seq`.
    AllSettledWithin,

    /// Grace exceeded; some refreshes were abandoned mid-flight.
    ///
    /// Sets: `at`, `seq`.
    GraceExceeded,

    // === Subscriber plumbing ===
    /// A subscriber panicked while processing an event.
    ///
    /// Sets: `source` (subscriber name), `reason`, `at`, `seq`.
    SubscriberPanicked,

    /// A subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `source` (subscriber name), `reason`, `at`, `seq`.
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Source id (or subscriber name for subscriber plumbing events).
    pub source: Option<Arc<str>>,
    /// Human-readable reason (errors, zone names, overflow details).
    pub reason: Option<Arc<str>>,
    /// Attempt or count, depending on the kind.
    pub attempt: Option<u32>,
    /// Delay/interval in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Signed clock delta in milliseconds (clock anomaly events).
    pub delta_ms: Option<i64>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            source: None,
            reason: None,
            attempt: None,
            delay_ms: None,
            timeout_ms: None,
            delta_ms: None,
        }
    }

    /// Attaches a source id.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches a signed clock delta in milliseconds.
    #[inline]
    pub fn with_delta(mut self, delta_ms: i64) -> Self {
        self.delta_ms = Some(delta_ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::now(EventKind::RefreshStarting);
        let b = Event::now(EventKind::RefreshCompleted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builder_sets_fields() {
        let ev = Event::now(EventKind::RefreshFailed)
            .with_source("feed-a")
            .with_reason("boom")
            .with_attempt(3)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(ev.source.as_deref(), Some("feed-a"));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
        assert_eq!(ev.attempt, Some(3));
        assert_eq!(ev.timeout_ms, Some(5000));
    }
}
