//! # ClockMonitor: periodic clock-anomaly detection.
//!
//! Every tick (1s by default) the monitor compares where the wall clock
//! *should* be — `last_wall + (monotonic() − last_monotonic)` — with where it
//! actually is, and classifies the divergence:
//!
//! ```text
//! |actual − expected| > jump_threshold   → JumpForward / JumpBackward
//! monotonic delta   > wake_threshold     → SystemWake
//! zone name changed                      → TimezoneChange
//! UTC offset changed, name unchanged     → DstChange
//! drift_floor ≤ |delta| ≤ jump_threshold → Drift (informational)
//! ```
//!
//! ## Rules
//! - All anomalies found in one tick are delivered as **one batch**, never
//!   partially.
//! - Watchers run in registration order; a panicking watcher is caught and
//!   never stops the loop or the remaining watchers.
//! - Every anomaly is also published on the event bus.
//! - Detection itself is a pure function over two snapshots and is tested
//!   without touching the wall clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::clock::ClockService;
use crate::events::{Bus, Event, EventKind};

/// Thresholds for the clock monitor.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Monitoring cadence.
    pub tick: Duration,
    /// Wall-vs-expected divergence beyond which a jump is reported.
    pub jump_threshold: Duration,
    /// Divergence floor below which a delta is ignored entirely.
    pub drift_floor: Duration,
    /// Monotonic gap between ticks beyond which a system wake is reported.
    /// Kept large to guard against false positives from scheduling jitter.
    pub wake_threshold: Duration,
}

impl Default for MonitorConfig {
    /// `tick = 1s`, `jump_threshold = 5s`, `drift_floor = 100ms`,
    /// `wake_threshold = 5min`.
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            jump_threshold: Duration::from_secs(5),
            drift_floor: Duration::from_millis(100),
            wake_threshold: Duration::from_secs(5 * 60),
        }
    }
}

/// Classification of a detected clock anomaly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnomalyKind {
    /// Wall clock jumped forward past the threshold.
    JumpForward,
    /// Wall clock jumped backward past the threshold.
    JumpBackward,
    /// Monotonic gap indicates the system slept and resumed.
    SystemWake,
    /// Resolved timezone name changed.
    TimezoneChange,
    /// UTC offset changed while the zone name did not.
    DstChange,
    /// Sub-threshold divergence, informational only.
    Drift,
}

/// One detected anomaly; a tick may produce several.
#[derive(Clone, Debug)]
pub struct ClockAnomaly {
    /// What was detected.
    pub kind: AnomalyKind,
    /// Signed delta in milliseconds (meaning depends on `kind`).
    pub delta_ms: i64,
    /// Wall-clock time of the detecting tick.
    pub at_ms: u64,
    /// New zone name (timezone changes only).
    pub zone: Option<String>,
}

impl ClockAnomaly {
    fn to_event(&self) -> Event {
        let kind = match self.kind {
            AnomalyKind::JumpForward => EventKind::ClockJumpForward,
            AnomalyKind::JumpBackward => EventKind::ClockJumpBackward,
            AnomalyKind::SystemWake => EventKind::SystemWake,
            AnomalyKind::TimezoneChange => EventKind::TimezoneChanged,
            AnomalyKind::DstChange => EventKind::DstChanged,
            AnomalyKind::Drift => EventKind::ClockDrift,
        };
        let mut ev = Event::now(kind).with_delta(self.delta_ms);
        if let Some(zone) = &self.zone {
            ev = ev.with_reason(zone.clone());
        }
        ev
    }
}

/// Contract for clock-anomaly watchers.
///
/// Invoked from the monitor's tick task with the full batch of one tick.
#[async_trait]
pub trait ClockWatch: Send + Sync + 'static {
    /// Handle the batch of anomalies detected in one tick.
    async fn on_anomalies(&self, batch: &[ClockAnomaly]);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

type WatcherList = Mutex<Vec<(u64, Arc<dyn ClockWatch>)>>;

/// Unsubscribe handle returned by [`ClockMonitor::watch`].
///
/// Dropping the guard (or calling [`WatchGuard::unsubscribe`]) removes the
/// watcher.
pub struct WatchGuard {
    id: u64,
    watchers: Weak<WatcherList>,
}

impl WatchGuard {
    /// Removes the watcher explicitly.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(list) = self.watchers.upgrade() {
            let mut list = list.lock().unwrap_or_else(|e| e.into_inner());
            list.retain(|(id, _)| *id != self.id);
        }
    }
}

/// State carried between ticks; used only to compute deltas, never persisted.
#[derive(Clone, Debug)]
struct ClockSnapshot {
    wall_ms: u64,
    monotonic: Instant,
    zone: String,
    offset_secs: i32,
}

/// Periodic clock monitor.
pub struct ClockMonitor {
    cfg: MonitorConfig,
    clock: ClockService,
    bus: Bus,
    watchers: Arc<WatcherList>,
    next_watch_id: AtomicU64,
    snapshot: Mutex<Option<ClockSnapshot>>,
}

impl ClockMonitor {
    /// Creates a new monitor (call [`ClockMonitor::run`] to start ticking).
    pub fn new(cfg: MonitorConfig, clock: ClockService, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            clock,
            bus,
            watchers: Arc::new(Mutex::new(Vec::new())),
            next_watch_id: AtomicU64::new(1),
            snapshot: Mutex::new(None),
        })
    }

    /// Registers a watcher; returns the unsubscribe guard.
    ///
    /// Watchers are invoked in registration order.
    pub fn watch(&self, watcher: Arc<dyn ClockWatch>) -> WatchGuard {
        let id = self.next_watch_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut list = self.watchers.lock().unwrap_or_else(|e| e.into_inner());
            list.push((id, watcher));
        }
        WatchGuard {
            id,
            watchers: Arc::downgrade(&self.watchers),
        }
    }

    /// Spawns the tick loop; stops when `token` is cancelled.
    pub fn run(self: &Arc<Self>, token: CancellationToken) {
        let me = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(me.cfg.tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => me.tick().await,
                }
            }
        });
    }

    /// One monitoring tick: snapshot, detect, publish, deliver.
    async fn tick(&self) {
        let cur = self.read_now();
        let batch = {
            let mut snap = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
            let batch = match snap.as_ref() {
                Some(prev) => detect(&self.cfg, prev, &cur),
                None => Vec::new(),
            };
            *snap = Some(cur);
            batch
        };
        if batch.is_empty() {
            return;
        }

        for anomaly in &batch {
            self.bus.publish(anomaly.to_event());
        }

        let watchers: Vec<Arc<dyn ClockWatch>> = {
            let list = self.watchers.lock().unwrap_or_else(|e| e.into_inner());
            list.iter().map(|(_, w)| Arc::clone(w)).collect()
        };
        for watcher in watchers {
            let fut = watcher.on_anomalies(&batch);
            if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                warn!(watcher = watcher.name(), ?panic_err, "clock watcher panicked");
                self.bus
                    .publish(Event::subscriber_panicked(watcher.name(), format!("{panic_err:?}")));
            }
        }
    }

    fn read_now(&self) -> ClockSnapshot {
        let offset_secs = chrono::Local::now().offset().local_minus_utc();
        let zone = iana_time_zone::get_timezone().unwrap_or_else(|_| "unknown".to_string());
        ClockSnapshot {
            wall_ms: self.clock.now_ms(),
            monotonic: self.clock.monotonic(),
            zone,
            offset_secs,
        }
    }
}

/// Pure anomaly detection over two consecutive snapshots.
fn detect(cfg: &MonitorConfig, prev: &ClockSnapshot, cur: &ClockSnapshot) -> Vec<ClockAnomaly> {
    let mut out = Vec::new();

    let mono_delta_ms = cur
        .monotonic
        .saturating_duration_since(prev.monotonic)
        .as_millis()
        .min(u128::from(u64::MAX)) as i64;
    let expected_wall = i128::from(prev.wall_ms) + i128::from(mono_delta_ms);
    let delta_ms = (i128::from(cur.wall_ms) - expected_wall).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;

    if mono_delta_ms > cfg.wake_threshold.as_millis() as i64 {
        out.push(ClockAnomaly {
            kind: AnomalyKind::SystemWake,
            delta_ms: mono_delta_ms,
            at_ms: cur.wall_ms,
            zone: None,
        });
    }

    let jump = cfg.jump_threshold.as_millis() as i64;
    let drift = cfg.drift_floor.as_millis() as i64;
    if delta_ms > jump {
        out.push(ClockAnomaly {
            kind: AnomalyKind::JumpForward,
            delta_ms,
            at_ms: cur.wall_ms,
            zone: None,
        });
    } else if delta_ms < -jump {
        out.push(ClockAnomaly {
            kind: AnomalyKind::JumpBackward,
            delta_ms,
            at_ms: cur.wall_ms,
            zone: None,
        });
    } else if delta_ms.abs() >= drift {
        out.push(ClockAnomaly {
            kind: AnomalyKind::Drift,
            delta_ms,
            at_ms: cur.wall_ms,
            zone: None,
        });
    }

    if cur.zone != prev.zone {
        out.push(ClockAnomaly {
            kind: AnomalyKind::TimezoneChange,
            delta_ms: 0,
            at_ms: cur.wall_ms,
            zone: Some(cur.zone.clone()),
        });
    } else if cur.offset_secs != prev.offset_secs {
        let offset_delta_ms = i64::from(cur.offset_secs - prev.offset_secs) * 1000;
        out.push(ClockAnomaly {
            kind: AnomalyKind::DstChange,
            delta_ms: offset_delta_ms,
            at_ms: cur.wall_ms,
            zone: None,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(base: Instant, mono_offset: Duration, wall_ms: u64, zone: &str, offset: i32) -> ClockSnapshot {
        ClockSnapshot {
            wall_ms,
            monotonic: base + mono_offset,
            zone: zone.to_string(),
            offset_secs: offset,
        }
    }

    fn kinds(batch: &[ClockAnomaly]) -> Vec<AnomalyKind> {
        batch.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn quiet_tick_detects_nothing() {
        let cfg = MonitorConfig::default();
        let base = Instant::now();
        let prev = snap(base, Duration::ZERO, 1_000_000, "UTC", 0);
        let cur = snap(base, Duration::from_secs(1), 1_001_000, "UTC", 0);
        assert!(detect(&cfg, &prev, &cur).is_empty());
    }

    #[test]
    fn forward_jump_past_threshold() {
        let cfg = MonitorConfig::default();
        let base = Instant::now();
        let prev = snap(base, Duration::ZERO, 1_000_000, "UTC", 0);
        // one second of monotonic time, ten seconds of wall time
        let cur = snap(base, Duration::from_secs(1), 1_011_000, "UTC", 0);
        let batch = detect(&cfg, &prev, &cur);
        assert_eq!(kinds(&batch), vec![AnomalyKind::JumpForward]);
        assert_eq!(batch[0].delta_ms, 10_000);
    }

    #[test]
    fn backward_jump_past_threshold() {
        let cfg = MonitorConfig::default();
        let base = Instant::now();
        let prev = snap(base, Duration::ZERO, 1_000_000, "UTC", 0);
        let cur = snap(base, Duration::from_secs(1), 993_000, "UTC", 0);
        let batch = detect(&cfg, &prev, &cur);
        assert_eq!(kinds(&batch), vec![AnomalyKind::JumpBackward]);
        assert!(batch[0].delta_ms < 0);
    }

    #[test]
    fn sub_threshold_delta_is_drift() {
        let cfg = MonitorConfig::default();
        let base = Instant::now();
        let prev = snap(base, Duration::ZERO, 1_000_000, "UTC", 0);
        let cur = snap(base, Duration::from_secs(1), 1_001_500, "UTC", 0);
        assert_eq!(kinds(&detect(&cfg, &prev, &cur)), vec![AnomalyKind::Drift]);
    }

    #[test]
    fn tiny_delta_is_ignored() {
        let cfg = MonitorConfig::default();
        let base = Instant::now();
        let prev = snap(base, Duration::ZERO, 1_000_000, "UTC", 0);
        let cur = snap(base, Duration::from_secs(1), 1_001_050, "UTC", 0);
        assert!(detect(&cfg, &prev, &cur).is_empty());
    }

    #[test]
    fn long_monotonic_gap_is_system_wake() {
        let cfg = MonitorConfig::default();
        let base = Instant::now();
        let prev = snap(base, Duration::ZERO, 1_000_000, "UTC", 0);
        // six minutes of monotonic gap, wall kept in step
        let cur = snap(base, Duration::from_secs(360), 1_360_000, "UTC", 0);
        assert_eq!(kinds(&detect(&cfg, &prev, &cur)), vec![AnomalyKind::SystemWake]);
    }

    #[test]
    fn zone_rename_beats_offset_change() {
        let cfg = MonitorConfig::default();
        let base = Instant::now();
        let prev = snap(base, Duration::ZERO, 1_000_000, "Europe/Berlin", 3600);
        let cur = snap(base, Duration::from_secs(1), 1_001_000, "Europe/London", 0);
        let batch = detect(&cfg, &prev, &cur);
        assert_eq!(kinds(&batch), vec![AnomalyKind::TimezoneChange]);
        assert_eq!(batch[0].zone.as_deref(), Some("Europe/London"));
    }

    #[test]
    fn offset_change_with_same_zone_is_dst() {
        let cfg = MonitorConfig::default();
        let base = Instant::now();
        let prev = snap(base, Duration::ZERO, 1_000_000, "Europe/Berlin", 3600);
        let cur = snap(base, Duration::from_secs(1), 1_001_000, "Europe/Berlin", 7200);
        let batch = detect(&cfg, &prev, &cur);
        assert_eq!(kinds(&batch), vec![AnomalyKind::DstChange]);
        assert_eq!(batch[0].delta_ms, 3_600_000);
    }

    #[test]
    fn one_tick_can_batch_several_anomalies() {
        let cfg = MonitorConfig::default();
        let base = Instant::now();
        let prev = snap(base, Duration::ZERO, 1_000_000, "UTC", 0);
        // wake + forward jump together (resume after sleep)
        let cur = snap(base, Duration::from_secs(400), 2_000_000, "UTC", 0);
        let batch = detect(&cfg, &prev, &cur);
        assert!(kinds(&batch).contains(&AnomalyKind::SystemWake));
        assert!(kinds(&batch).contains(&AnomalyKind::JumpForward));
    }
}
