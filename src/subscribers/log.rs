//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] forwards events to `tracing` in a compact, human-readable
//! form. This is primarily useful for development, debugging, and examples —
//! implement a custom [`Subscribe`](crate::Subscribe) for structured metrics
//! or alerting.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Tracing-backed logging subscriber.
///
/// Enabled via the `logging` feature.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let source = e.source.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::RefreshStarting => {
                info!(source, attempt = e.attempt, "refresh starting");
            }
            EventKind::RefreshCompleted => {
                info!(source, "refresh completed");
            }
            EventKind::RefreshFailed => {
                warn!(source, reason = e.reason.as_deref(), attempt = e.attempt, "refresh failed");
            }
            EventKind::RefreshTimedOut => {
                warn!(source, timeout_ms = e.timeout_ms, "refresh timed out");
            }
            EventKind::RefreshSkipped => {
                info!(source, "refresh skipped: already in flight");
            }
            EventKind::QueueDropped => {
                warn!(source, "oldest queued refresh dropped: queue full");
            }
            EventKind::SourceScheduled => {
                info!(source, interval_ms = e.delay_ms, "source scheduled");
            }
            EventKind::SourceUnscheduled => {
                info!(source, "source unscheduled");
            }
            EventKind::SourceExhausted => {
                warn!(source, failures = e.attempt, "source exhausted failure budget; removed");
            }
            EventKind::CircuitOpened => {
                warn!(source, reset_ms = e.delay_ms, "circuit opened");
            }
            EventKind::CircuitHalfOpened => {
                info!(source, "circuit half-open: probing");
            }
            EventKind::CircuitClosed => {
                info!(source, "circuit closed");
            }
            EventKind::NetworkOffline => info!("network offline"),
            EventKind::NetworkOnline => info!("network online"),
            EventKind::CatchUpStarted => {
                info!(overdue = e.attempt, stagger_ms = e.delay_ms, "catch-up pass started");
            }
            EventKind::SweepTriggered => {
                info!(source, "overdue sweep triggered refresh");
            }
            EventKind::ClockJumpForward | EventKind::ClockJumpBackward => {
                warn!(delta_ms = e.delta_ms, kind = ?e.kind, "clock jump detected");
            }
            EventKind::SystemWake => {
                info!(delta_ms = e.delta_ms, "system wake detected");
            }
            EventKind::TimezoneChanged => {
                info!(zone = e.reason.as_deref(), "timezone changed");
            }
            EventKind::DstChanged => {
                info!(offset_delta_ms = e.delta_ms, "dst change detected");
            }
            EventKind::ClockDrift => {}
            EventKind::DestroyRequested => info!("destroy requested"),
            EventKind::AllSettledWithin => info!("all refreshes settled within grace"),
            EventKind::GraceExceeded => warn!("teardown grace exceeded"),
            EventKind::SubscriberPanicked | EventKind::SubscriberOverflow => {
                warn!(subscriber = source, reason = e.reason.as_deref(), kind = ?e.kind, "subscriber issue");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
