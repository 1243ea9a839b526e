//! # Schedule state and source descriptors.
//!
//! One [`Schedule`] per registered source, keyed by the source id. The host
//! describes a source with a [`SourceDescriptor`]; intervals arrive as text
//! (`"15 minutes"`), a bare minute count, or an exact duration, and are
//! validated against the configured bounds at the API boundary.

use std::time::Duration;

use crate::clock::Alignment;
use crate::error::ScheduleError;

/// Interval specification accepted at the API boundary.
///
/// - `Text`: `"N second|minute|hour|day"` (singular or plural), or a bare
///   number interpreted as minutes
/// - `Minutes`: a bare minute count
/// - `Exact`: a duration, taken as-is
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntervalSpec {
    Text(String),
    Minutes(u64),
    Exact(Duration),
}

/// Per-source refresh options in a descriptor.
#[derive(Clone, Debug)]
pub struct RefreshOptions {
    /// How often to refresh.
    pub interval: IntervalSpec,
    /// Disabled sources are treated as unscheduled.
    pub enabled: bool,
    /// Persisted last-success timestamp (ms epoch), if the host has one.
    pub last_refresh: Option<u64>,
    /// Align fire times to minute boundaries.
    pub align_to_minute: bool,
    /// Align fire times to hour boundaries.
    pub align_to_hour: bool,
    /// Align fire times to day boundaries.
    pub align_to_day: bool,
}

impl RefreshOptions {
    /// Enabled options with the given interval and no alignment.
    pub fn every(interval: IntervalSpec) -> Self {
        Self {
            interval,
            enabled: true,
            last_refresh: None,
            align_to_minute: false,
            align_to_hour: false,
            align_to_day: false,
        }
    }

    pub(crate) fn alignment(&self) -> Alignment {
        Alignment {
            to_minute: self.align_to_minute,
            to_hour: self.align_to_hour,
            to_day: self.align_to_day,
        }
    }
}

/// What the host registers: a stable string id, a type tag for display, and
/// the refresh options.
#[derive(Clone, Debug)]
pub struct SourceDescriptor {
    /// Stable source identifier (normalized to a non-empty string).
    pub source_id: String,
    /// Source type tag (display only; the engine does not branch on it).
    pub source_type: String,
    /// Refresh options.
    pub refresh: RefreshOptions,
}

/// Authoritative schedule state for one source.
#[derive(Clone, Debug)]
pub struct Schedule {
    /// Stable source identifier.
    pub source_id: String,
    /// Source type tag.
    pub source_type: String,
    /// Validated refresh interval.
    pub interval: Duration,
    /// Disabled schedules never arm timers.
    pub enabled: bool,
    /// Requested wall-clock alignment.
    pub alignment: Alignment,
    /// Last successful completion (ms epoch); `None` until the first success.
    pub last_refresh: Option<u64>,
    /// Computed absolute next-fire time (ms epoch); kept current even while
    /// offline so the schedule survives outages.
    pub next_refresh: Option<u64>,
    /// Attempts since the last success.
    pub retry_count: u32,
    /// Consecutive non-network failures; saturates into fatal unscheduling.
    pub failure_count: u32,
}

impl Schedule {
    /// True until the source completes its first refresh.
    pub fn never_refreshed(&self) -> bool {
        self.last_refresh.is_none()
    }

    /// Overdue means elapsed-since-last-success exceeds the interval. A
    /// never-refreshed source is always overdue.
    pub fn is_overdue(&self, now_ms: u64) -> bool {
        match self.last_refresh {
            Some(t) => now_ms.saturating_sub(t) > self.interval.as_millis() as u64,
            None => true,
        }
    }

    /// Milliseconds past the due point; 0 when not overdue, `u64::MAX` for a
    /// never-refreshed source (so it sorts first in catch-up).
    pub fn overdue_by(&self, now_ms: u64) -> u64 {
        match self.last_refresh {
            Some(t) => {
                let due = t.saturating_add(self.interval.as_millis() as u64);
                now_ms.saturating_sub(due)
            }
            None => u64::MAX,
        }
    }
}

/// Resolves an [`IntervalSpec`] against the configured bounds.
pub(crate) fn resolve_interval(
    spec: &IntervalSpec,
    min: Duration,
    max: Duration,
) -> Result<Duration, ScheduleError> {
    let interval = match spec {
        IntervalSpec::Exact(d) => *d,
        IntervalSpec::Minutes(m) => Duration::from_secs(m.saturating_mul(60)),
        IntervalSpec::Text(s) => {
            parse_interval_text(s).ok_or_else(|| ScheduleError::InvalidInterval {
                value: s.clone(),
            })?
        }
    };
    if interval < min || interval > max {
        return Err(ScheduleError::IntervalOutOfRange { interval, min, max });
    }
    Ok(interval)
}

/// Parses `"N second|minute|hour|day"` (singular or plural, common
/// abbreviations accepted) or a bare number meaning minutes.
fn parse_interval_text(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(minutes) = s.parse::<u64>() {
        return Some(Duration::from_secs(minutes.saturating_mul(60)));
    }

    let mut parts = s.split_whitespace();
    let n: u64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let secs = match unit.to_ascii_lowercase().as_str() {
        "second" | "seconds" | "sec" | "secs" | "s" => n,
        "minute" | "minutes" | "min" | "mins" | "m" => n.saturating_mul(60),
        "hour" | "hours" | "hr" | "hrs" | "h" => n.saturating_mul(3600),
        "day" | "days" | "d" => n.saturating_mul(86_400),
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
