//! Error types used by the refetch runtime and fetch callbacks.
//!
//! This module defines three error enums:
//!
//! - [`FetchError`] — errors reported by (or on behalf of) a single fetch attempt.
//! - [`ScheduleError`] — synchronous rejections at the scheduling API boundary.
//! - [`RuntimeError`] — errors raised by the runtime itself (teardown).
//!
//! All types provide `as_label` for stable snake_case identifiers in
//! logs/metrics. [`FetchError::is_network`] drives the failure-accounting
//! split: network-classified errors are excluded from circuit-breaker and
//! consecutive-failure budgets.

use std::time::Duration;
use thiserror::Error;

/// Message fragments that classify an error as a transport-level network
/// failure rather than a remote/application failure.
const NETWORK_SIGNATURES: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "disconnected",
    "network unreachable",
    "host unreachable",
    "dns",
    "name resolution",
    "broken pipe",
    "offline",
];

/// # Errors produced by a single fetch attempt.
///
/// The host's fetch callback returns these; the runtime also synthesizes
/// [`FetchError::Timeout`] and [`FetchError::Cancelled`] itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// Transport-level failure (connection refused, reset, DNS, ...).
    ///
    /// Excluded from failure-count accounting; recovery happens through the
    /// offline/online path, not through the circuit breaker.
    #[error("network error: {error}")]
    Network {
        /// The underlying error message.
        error: String,
    },

    /// Remote/application failure (non-2xx status, parse failure, ...).
    ///
    /// Counts toward the circuit-breaker and consecutive-failure budgets.
    #[error("remote error: {error}")]
    Remote {
        /// The underlying error message.
        error: String,
    },

    /// The fetch did not settle within its timeout. Counts as a failure; the
    /// underlying call may still be in flight but is no longer awaited.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The request was discarded before (or instead of) executing: queue
    /// overflow, unscheduling, or runtime teardown.
    #[error("refresh cancelled")]
    Cancelled,
}

impl FetchError {
    /// Classifies a raw error message into [`FetchError::Network`] or
    /// [`FetchError::Remote`] by sniffing for transport signatures.
    ///
    /// Hosts that cannot classify their transport errors themselves can
    /// funnel everything through here.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("timed out") || lower.contains("timeout") {
            return FetchError::Network { error: message };
        }
        if NETWORK_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
            return FetchError::Network { error: message };
        }
        FetchError::Remote { error: message }
    }

    /// True when this error is transport-classified and must not count
    /// toward the consecutive-failure budget.
    pub fn is_network(&self) -> bool {
        matches!(self, FetchError::Network { .. })
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FetchError::Network { .. } => "fetch_network",
            FetchError::Remote { .. } => "fetch_remote",
            FetchError::Timeout { .. } => "fetch_timeout",
            FetchError::Cancelled => "fetch_cancelled",
        }
    }
}

/// # Synchronous rejections at the scheduling API boundary.
///
/// Programmer errors are rejected here, before any schedule state is
/// touched; an invalid descriptor never ends up half-scheduled.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The interval string could not be parsed.
    #[error("invalid interval: {value:?}")]
    InvalidInterval {
        /// The rejected input.
        value: String,
    },

    /// The interval parsed but falls outside the configured bounds.
    #[error("interval {interval:?} outside [{min:?}, {max:?}]")]
    IntervalOutOfRange {
        /// Parsed interval.
        interval: Duration,
        /// Configured minimum.
        min: Duration,
        /// Configured maximum.
        max: Duration,
    },

    /// Source identifiers must be non-empty strings.
    #[error("empty source id")]
    EmptySourceId,

    /// The runtime has been destroyed; no new sources can be scheduled.
    #[error("scheduler destroyed")]
    Destroyed,
}

impl ScheduleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ScheduleError::InvalidInterval { .. } => "schedule_invalid_interval",
            ScheduleError::IntervalOutOfRange { .. } => "schedule_interval_out_of_range",
            ScheduleError::EmptySourceId => "schedule_empty_source_id",
            ScheduleError::Destroyed => "schedule_destroyed",
        }
    }
}

/// # Errors produced by the refetch runtime itself.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Teardown grace period was exceeded; some refreshes were still in
    /// flight and are no longer awaited.
    #[error("teardown grace {grace:?} exceeded; still refreshing: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Source ids still mid-refresh when the grace expired.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_network_signatures() {
        assert!(FetchError::from_message("connection refused (os error 111)").is_network());
        assert!(FetchError::from_message("DNS lookup failed").is_network());
        assert!(FetchError::from_message("request timed out").is_network());
        assert!(FetchError::from_message("peer disconnected mid-stream").is_network());
    }

    #[test]
    fn classifies_remote_errors() {
        assert!(!FetchError::from_message("HTTP 503 Service Unavailable").is_network());
        assert!(!FetchError::from_message("unexpected EOF while parsing JSON").is_network());
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(FetchError::Cancelled.as_label(), "fetch_cancelled");
        assert_eq!(
            FetchError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .as_label(),
            "fetch_timeout"
        );
        assert_eq!(ScheduleError::EmptySourceId.as_label(), "schedule_empty_source_id");
    }
}
