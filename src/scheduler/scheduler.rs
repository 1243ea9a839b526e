//! # Scheduler: authoritative next-fire times and timer management.
//!
//! Owns per-source schedule state and drives timer callbacks that invoke a
//! refresh through the [`RefreshCoordinator`], while respecting network
//! availability and circuit-breaker backoff.
//!
//! ## Next-fire decision order
//! ```text
//! calculate_next_refresh(id):
//!   1. breaker backing off?   → honor its window instead of the interval
//!   2. overdue?               → now + small jittered delay (herd avoidance)
//!   3. else                   → last_refresh + interval, wall-aligned on
//!                               request, clamped to now + minimal_delay
//!   offline → store the result but arm no timer
//! ```
//!
//! ## Timer rules
//! - Exactly one timer per source is live at a time; arming a new one always
//!   clears the predecessor.
//! - A destroyed or offline scheduler arms nothing.
//! - Timer tasks hold only a weak reference; they die with the scheduler.
//!
//! ## Network transitions
//! ```text
//! online → offline: debounce, then clear every armed timer
//!                   (computed next_refresh values survive)
//! offline → online: staggered catch-up — overdue sources sorted
//!                   never-refreshed first, then most-overdue-first, fired
//!                   with stagger min(cap, budget / overdue_count); the rest
//!                   are simply re-armed
//! ```
//!
//! ## Failure accounting
//! Network-classified errors never touch the consecutive-failure budget;
//! remote and timeout errors do. Reaching the budget unschedules the source
//! permanently (the host must re-register it).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::breaker::BreakerState;
use crate::clock::{next_aligned_time, AnomalyKind, ClockAnomaly, ClockService, ClockWatch};
use crate::config::RefreshConfig;
use crate::coordinator::{BatchOptions, ExecuteOptions, RefreshCoordinator, RefreshOp, RefreshOutcome};
use crate::error::ScheduleError;
use crate::events::{Bus, Event, EventKind};
use crate::fetch::{FetchRef, RefreshReason};
use crate::scheduler::schedule::resolve_interval;
use crate::scheduler::{NetworkState, Schedule, ScheduleStore, SourceDescriptor};

/// Handle to one armed per-source timer.
struct TimerHandle {
    cancel: CancellationToken,
}

/// Per-source schedule owner. One instance per runtime; the store is
/// injected so independent instances can coexist in tests.
pub struct Scheduler {
    cfg: Arc<RefreshConfig>,
    clock: ClockService,
    bus: Bus,
    store: ScheduleStore,
    coordinator: Arc<RefreshCoordinator>,
    fetch: FetchRef,
    timers: Mutex<HashMap<String, TimerHandle>>,
    runtime_token: CancellationToken,
    destroyed: AtomicBool,
    offline: AtomicBool,
    net_epoch: AtomicU64,
    network: StdMutex<NetworkState>,
}

impl Scheduler {
    /// Creates a scheduler (call [`Scheduler::run`] to start the sweep).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: Arc<RefreshConfig>,
        clock: ClockService,
        bus: Bus,
        store: ScheduleStore,
        coordinator: Arc<RefreshCoordinator>,
        fetch: FetchRef,
        runtime_token: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            clock,
            bus,
            store,
            coordinator,
            fetch,
            timers: Mutex::new(HashMap::new()),
            runtime_token,
            destroyed: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            net_epoch: AtomicU64::new(0),
            network: StdMutex::new(NetworkState::default()),
        })
    }

    /// Spawns the periodic overdue sweep — the safety net against lost or
    /// corrupted timers.
    pub fn run(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let token = self.runtime_token.clone();
        let period = self.cfg.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // immediate first tick is not a sweep
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(scheduler) = weak.upgrade() else { break };
                        scheduler.sweep_overdue().await;
                    }
                }
            }
        });
    }

    /// Registers or updates a source.
    ///
    /// `last_refresh` and the failure counters survive updates. An interval
    /// change is only treated as "overdue" if the source was already overdue
    /// under the *previous* interval; otherwise the next fire is anchored at
    /// now + new interval.
    pub async fn schedule_source(
        self: &Arc<Self>,
        descriptor: SourceDescriptor,
    ) -> Result<(), ScheduleError> {
        if self.is_destroyed() {
            return Err(ScheduleError::Destroyed);
        }
        let source_id = descriptor.source_id.trim().to_string();
        if source_id.is_empty() {
            return Err(ScheduleError::EmptySourceId);
        }
        let interval = resolve_interval(
            &descriptor.refresh.interval,
            self.cfg.min_interval,
            self.cfg.max_interval,
        )?;

        if !descriptor.refresh.enabled {
            self.unschedule_source(&source_id).await;
            return Ok(());
        }

        let now = self.clock.now_ms();
        let alignment = descriptor.refresh.alignment();
        let interval_ms = interval.as_millis() as u64;

        let anchor_at_now = match self.store.schedule(&source_id).await {
            Some(prev) => {
                let was_overdue = prev.is_overdue(now);
                let interval_changed = prev.interval != interval;

                let mut merged = prev;
                merged.source_type = descriptor.source_type.clone();
                merged.interval = interval;
                merged.alignment = alignment;
                merged.enabled = true;
                if let Some(last) = descriptor.refresh.last_refresh {
                    merged.last_refresh = Some(last);
                }
                let newly_overdue = merged.is_overdue(now);
                self.store.insert(merged).await;

                interval_changed && !was_overdue && newly_overdue
            }
            None => {
                self.store
                    .insert(Schedule {
                        source_id: source_id.clone(),
                        source_type: descriptor.source_type.clone(),
                        interval,
                        enabled: true,
                        alignment,
                        last_refresh: descriptor.refresh.last_refresh,
                        next_refresh: None,
                        retry_count: 0,
                        failure_count: 0,
                    })
                    .await;
                false
            }
        };

        self.bus.publish(
            Event::now(EventKind::SourceScheduled)
                .with_source(source_id.clone())
                .with_delay(interval),
        );

        if anchor_at_now {
            let minimal = self.cfg.minimal_delay.as_millis() as u64;
            let mut next = if alignment.is_none() {
                now.saturating_add(interval_ms)
            } else {
                next_aligned_time(interval_ms, now, alignment, now)
            };
            if next < now.saturating_add(minimal) {
                next = now.saturating_add(minimal);
            }
            self.store
                .update(&source_id, |s| s.next_refresh = Some(next))
                .await;
            if !self.is_offline() {
                self.arm_timer(&source_id, next).await;
            }
        } else {
            self.reschedule(&source_id).await;
        }
        Ok(())
    }

    /// Removes a source: timer cleared, schedule and breaker dropped, queued
    /// requests rejected. An in-flight refresh is not aborted; its late
    /// completion is ignored.
    pub async fn unschedule_source(&self, source_id: &str) -> bool {
        self.clear_timer(source_id).await;
        let existed = self.store.remove(source_id).await.is_some();
        self.coordinator.cancel_queued(source_id).await;
        if existed {
            self.bus
                .publish(Event::now(EventKind::SourceUnscheduled).with_source(source_id));
        }
        existed
    }

    /// Triggers one refresh for `source_id`.
    ///
    /// No-op (returns `None`) when the source is unknown, disabled, already
    /// refreshing, fatally exhausted, or held back by its breaker.
    /// [`RefreshReason::Manual`] bypasses the breaker gate.
    pub async fn trigger_refresh(
        self: &Arc<Self>,
        source_id: &str,
        reason: RefreshReason,
    ) -> Option<RefreshOutcome> {
        if self.is_destroyed() {
            return None;
        }
        let now = self.clock.now_ms();
        let schedule = self.store.schedule(source_id).await?;
        if !schedule.enabled {
            return None;
        }
        if schedule.failure_count >= self.cfg.max_consecutive_failures {
            self.exhaust(source_id, schedule.failure_count).await;
            return None;
        }
        if self.coordinator.is_active(source_id).await {
            return None;
        }

        if reason != RefreshReason::Manual {
            let breaker = self.store.breaker(source_id).await;
            let was_open = breaker.state() == BreakerState::Open;
            if !breaker.can_attempt(now) {
                // Still inside the backoff window; respect it.
                self.reschedule(source_id).await;
                return None;
            }
            if was_open {
                self.bus
                    .publish(Event::now(EventKind::CircuitHalfOpened).with_source(source_id));
            }
        }

        let fetch = Arc::clone(&self.fetch);
        let id = source_id.to_string();
        let op = move || async move { fetch.fetch(&id, reason).await };
        let opts = ExecuteOptions {
            skip_if_active: true,
            timeout: self.cfg.refresh_timeout(),
        };
        let outcome = self.coordinator.execute(source_id, op, opts).await;
        self.apply_outcome(source_id, &outcome).await;
        Some(outcome)
    }

    /// Chunked "refresh all sources": every enabled source goes through the
    /// coordinator's batch path, then outcome accounting is applied per
    /// source. Returns the number of sources submitted.
    pub async fn refresh_all(self: &Arc<Self>, reason: RefreshReason) -> usize {
        if self.is_destroyed() {
            return 0;
        }
        let ids: Vec<String> = self
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|s| s.enabled)
            .map(|s| s.source_id)
            .collect();
        if ids.is_empty() {
            return 0;
        }

        let ops: Vec<(String, RefreshOp)> = ids
            .iter()
            .map(|id| {
                let fetch = Arc::clone(&self.fetch);
                let id_for_op = id.clone();
                let op: RefreshOp =
                    Box::new(move || Box::pin(async move { fetch.fetch(&id_for_op, reason).await }));
                (id.clone(), op)
            })
            .collect();

        let opts = ExecuteOptions {
            skip_if_active: true,
            timeout: self.cfg.refresh_timeout(),
        };
        let outcomes = self
            .coordinator
            .execute_batch(ops, BatchOptions::default(), opts)
            .await;

        let submitted = ids.len();
        for (id, outcome) in ids.into_iter().zip(outcomes) {
            self.apply_outcome(&id, &outcome).await;
        }
        submitted
    }

    /// Host-pushed network transition.
    ///
    /// Going offline clears armed timers after a debounce (rapid flapping
    /// collapses); computed `next_refresh` values survive. Coming online
    /// runs the staggered catch-up pass.
    pub async fn set_network_state(self: &Arc<Self>, state: NetworkState) {
        if self.is_destroyed() {
            return;
        }
        let was_online = {
            let mut net = self.network.lock().unwrap_or_else(|e| e.into_inner());
            let was = net.is_online;
            *net = state;
            was
        };
        let epoch = self.net_epoch.fetch_add(1, Ordering::SeqCst) + 1;

        if state.is_online && !was_online {
            self.offline.store(false, Ordering::SeqCst);
            self.bus.publish(Event::now(EventKind::NetworkOnline));
            self.catch_up().await;
        } else if !state.is_online && was_online {
            let weak = Arc::downgrade(self);
            let debounce = self.cfg.offline_debounce;
            tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                let Some(scheduler) = weak.upgrade() else { return };
                // A newer transition supersedes this one.
                if scheduler.net_epoch.load(Ordering::SeqCst) != epoch {
                    return;
                }
                scheduler.offline.store(true, Ordering::SeqCst);
                scheduler.bus.publish(Event::now(EventKind::NetworkOffline));
                scheduler.clear_all_timers().await;
            });
        }
    }

    /// Staggered catch-up over overdue sources; non-overdue sources are
    /// simply re-armed. Also used on system wake and forward clock jumps.
    pub async fn catch_up(self: &Arc<Self>) {
        if self.is_destroyed() || self.is_offline() {
            return;
        }
        let now = self.clock.now_ms();
        let buffer = self.cfg.catchup_overdue_buffer.as_millis() as u64;

        let mut overdue: Vec<(String, u64)> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        for s in self.store.snapshot().await.into_iter().filter(|s| s.enabled) {
            let by = s.overdue_by(now);
            if by > buffer {
                overdue.push((s.source_id, by));
            } else {
                current.push(s.source_id);
            }
        }

        for id in &current {
            self.reschedule(id).await;
        }
        if overdue.is_empty() {
            return;
        }

        // Never-refreshed first (u64::MAX), then most-overdue-first.
        overdue.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let count = overdue.len() as u32;
        let stagger = self.cfg.catchup_stagger_cap.min(self.cfg.catchup_stagger_budget / count);
        self.bus.publish(
            Event::now(EventKind::CatchUpStarted)
                .with_attempt(count)
                .with_delay(stagger),
        );

        let weak = Arc::downgrade(self);
        let token = self.runtime_token.clone();
        tokio::spawn(async move {
            for (i, (id, _)) in overdue.into_iter().enumerate() {
                if i > 0 {
                    tokio::select! {
                        _ = tokio::time::sleep(stagger) => {}
                        _ = token.cancelled() => return,
                    }
                }
                let Some(scheduler) = weak.upgrade() else { return };
                if scheduler.is_destroyed() || scheduler.is_offline() {
                    return;
                }
                let me = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    me.trigger_refresh(&id, RefreshReason::CatchUp).await;
                });
            }
        });
    }

    /// Recomputes and re-arms every source (backward clock jumps). The
    /// next-fire arithmetic clamps stale bases, so every result lands in
    /// the future.
    pub async fn rearm_all(self: &Arc<Self>) {
        for id in self.store.ids().await {
            self.reschedule(&id).await;
        }
    }

    /// Adapter registering this scheduler as a clock watcher: wake/forward
    /// jumps run a catch-up pass, backward jumps re-arm everything.
    pub fn clock_watch(self: &Arc<Self>) -> Arc<dyn ClockWatch> {
        Arc::new(SchedulerClockWatch {
            scheduler: Arc::downgrade(self),
        })
    }

    /// Current host-reported network state.
    pub fn network(&self) -> NetworkState {
        *self.network.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The injected store (read access for status assembly).
    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    /// Teardown: no more scheduling, cancel the sweep and every timer.
    /// Queued requests and in-flight waits are the coordinator's side.
    pub async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.runtime_token.cancel();
        self.clear_all_timers().await;
    }

    // ---------------------------
    // Internals
    // ---------------------------

    /// Computes, stores, and arms the next fire for one source.
    async fn reschedule(self: &Arc<Self>, source_id: &str) {
        if let Some(next) = self.calculate_next_refresh(source_id).await {
            self.arm_timer(source_id, next).await;
        }
    }

    /// Next-fire decision order: breaker window, then overdue jitter, then
    /// interval arithmetic. Stores the computed `next_refresh`
    /// unconditionally; returns `None` when no timer should be armed
    /// (offline, unknown, or disabled source).
    async fn calculate_next_refresh(&self, source_id: &str) -> Option<u64> {
        let now = self.clock.now_ms();
        let schedule = self.store.schedule(source_id).await?;
        if !schedule.enabled {
            return None;
        }
        let interval_ms = schedule.interval.as_millis() as u64;
        let minimal = self.cfg.minimal_delay.as_millis() as u64;

        let backoff_until = match self.store.peek_breaker(source_id).await {
            Some(breaker) => breaker.backoff_until(now),
            None => None,
        };

        let mut next = if let Some(until) = backoff_until {
            until
        } else if schedule.is_overdue(now) {
            now.saturating_add(self.overdue_delay_ms(schedule.never_refreshed()))
        } else {
            // Clamping the base to `now` anchors schedules whose
            // last_refresh sits in the future after a backward clock jump.
            let base = schedule.last_refresh.unwrap_or(now).min(now);
            if schedule.alignment.is_none() {
                base.saturating_add(interval_ms)
            } else {
                next_aligned_time(interval_ms, base, schedule.alignment, now)
            }
        };

        if next < now.saturating_add(minimal) {
            next = now.saturating_add(minimal);
        }
        self.store
            .update(source_id, |s| s.next_refresh = Some(next))
            .await?;

        if self.is_offline() {
            return None;
        }
        Some(next)
    }

    /// Jittered delay for an overdue source so a burst of overdue sources
    /// never fires in the same tick.
    fn overdue_delay_ms(&self, never_refreshed: bool) -> u64 {
        let mut rng = rand::rng();
        if never_refreshed {
            let max = (self.cfg.first_fire_jitter_max.as_millis() as u64).max(10);
            rng.random_range(10..=max)
        } else {
            let max = (self.cfg.overdue_jitter_max.as_millis() as u64).max(50);
            rng.random_range(50..=max)
        }
    }

    /// Arms the single timer for `source_id`, replacing any predecessor.
    // Returns an explicitly boxed `Send` future instead of an `async fn` to
    // break the recursive-async Send-inference cycle (arm_timer spawns a task
    // that calls trigger_refresh -> reschedule -> arm_timer); a concrete boxed
    // return type keeps the compiler from having to prove an opaque,
    // self-referential future is `Send`.
    fn arm_timer<'a>(
        self: &'a Arc<Self>,
        source_id: &'a str,
        fire_at_ms: u64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
        if self.is_destroyed() || self.is_offline() {
            return;
        }
        let delay = Duration::from_millis(fire_at_ms.saturating_sub(self.clock.now_ms()));
        let cancel = self.runtime_token.child_token();
        let task_cancel = cancel.clone();
        let weak = Arc::downgrade(self);
        let id = source_id.to_string();

        tokio::spawn(async move {
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            tokio::select! {
                _ = task_cancel.cancelled() => {}
                _ = &mut sleep => {
                    let Some(scheduler) = weak.upgrade() else { return };
                    scheduler.trigger_refresh(&id, RefreshReason::Scheduled).await;
                }
            }
        });

        let mut timers = self.timers.lock().await;
        if let Some(prev) = timers.insert(source_id.to_string(), TimerHandle { cancel }) {
            prev.cancel.cancel();
        }
        })
    }

    async fn clear_timer(&self, source_id: &str) {
        let mut timers = self.timers.lock().await;
        if let Some(handle) = timers.remove(source_id) {
            handle.cancel.cancel();
        }
    }

    async fn clear_all_timers(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.cancel.cancel();
        }
    }

    /// Applies a refresh outcome: breaker + counter accounting, fatal
    /// exhaustion, and re-arming. A source unscheduled mid-flight is left
    /// alone (the late completion is safely ignored).
    async fn apply_outcome(self: &Arc<Self>, source_id: &str, outcome: &RefreshOutcome) {
        let now = self.clock.now_ms();
        match outcome {
            RefreshOutcome::Completed { .. } => {
                let breaker = self.store.breaker(source_id).await;
                let was = breaker.state();
                breaker.record_success(now);
                if was != BreakerState::Closed {
                    self.bus
                        .publish(Event::now(EventKind::CircuitClosed).with_source(source_id));
                }
                self.store
                    .update(source_id, |s| {
                        s.last_refresh = Some(now);
                        s.retry_count = 0;
                        s.failure_count = 0;
                    })
                    .await;
                self.reschedule(source_id).await;
            }
            RefreshOutcome::Failed { error, .. } => {
                if error.is_network() {
                    // Transient: recovery happens through the offline/online
                    // path, not the failure budget.
                    self.reschedule(source_id).await;
                    return;
                }
                let breaker = self.store.breaker(source_id).await;
                let was = breaker.state();
                let state = breaker.record_failure(now);
                if state == BreakerState::Open && was != BreakerState::Open {
                    let retry = breaker.status(now).retry_after.unwrap_or_default();
                    self.bus.publish(
                        Event::now(EventKind::CircuitOpened)
                            .with_source(source_id)
                            .with_delay(retry),
                    );
                }
                let failures = self
                    .store
                    .update(source_id, |s| {
                        s.retry_count = s.retry_count.saturating_add(1);
                        s.failure_count = s.failure_count.saturating_add(1);
                        s.failure_count
                    })
                    .await;
                match failures {
                    Some(f) if f >= self.cfg.max_consecutive_failures => {
                        self.exhaust(source_id, f).await;
                    }
                    Some(_) => self.reschedule(source_id).await,
                    None => {}
                }
            }
            RefreshOutcome::Skipped | RefreshOutcome::Dropped | RefreshOutcome::Cancelled => {}
        }
    }

    /// Fatal policy: the failure budget is spent; remove the source.
    async fn exhaust(&self, source_id: &str, failures: u32) {
        self.clear_timer(source_id).await;
        self.store.remove(source_id).await;
        self.coordinator.cancel_queued(source_id).await;
        self.bus.publish(
            Event::now(EventKind::SourceExhausted)
                .with_source(source_id)
                .with_attempt(failures)
                .with_reason("consecutive failure budget exhausted"),
        );
    }

    /// Safety net: scan for sources overdue past the sweep buffer and
    /// trigger a rate-limited subset.
    async fn sweep_overdue(self: &Arc<Self>) {
        if self.is_destroyed() || self.is_offline() {
            return;
        }
        let now = self.clock.now_ms();
        let buffer = self.cfg.sweep_overdue_buffer.as_millis() as u64;

        let mut overdue: Vec<(String, u64)> = Vec::new();
        for s in self.store.snapshot().await.into_iter().filter(|s| s.enabled) {
            let by = s.overdue_by(now);
            if by > buffer && !self.coordinator.is_active(&s.source_id).await {
                overdue.push((s.source_id, by));
            }
        }
        overdue.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        for (id, _) in overdue.into_iter().take(self.cfg.sweep_max_concurrent) {
            self.bus
                .publish(Event::now(EventKind::SweepTriggered).with_source(id.clone()));
            let me = Arc::clone(self);
            tokio::spawn(async move {
                me.trigger_refresh(&id, RefreshReason::Sweep).await;
            });
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}

/// Clock-anomaly wiring: wake and forward jumps behave like a network
/// recovery; backward jumps recompute every next-fire time.
struct SchedulerClockWatch {
    scheduler: Weak<Scheduler>,
}

#[async_trait]
impl ClockWatch for SchedulerClockWatch {
    async fn on_anomalies(&self, batch: &[ClockAnomaly]) {
        let Some(scheduler) = self.scheduler.upgrade() else {
            return;
        };
        let jumped_ahead = batch
            .iter()
            .any(|a| matches!(a.kind, AnomalyKind::SystemWake | AnomalyKind::JumpForward));
        let jumped_back = batch
            .iter()
            .any(|a| matches!(a.kind, AnomalyKind::JumpBackward));

        if jumped_ahead {
            scheduler.catch_up().await;
        } else if jumped_back {
            scheduler.rearm_all().await;
        }
    }

    fn name(&self) -> &'static str {
        "scheduler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::FetchFn;
    use crate::scheduler::{IntervalSpec, NetworkQuality, RefreshOptions};
    use std::sync::atomic::AtomicU32;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        FailRemote,
        FailNetwork,
    }

    struct Rig {
        scheduler: Arc<Scheduler>,
        store: ScheduleStore,
        calls: Arc<AtomicU32>,
    }

    fn rig(cfg: RefreshConfig, behavior: Behavior) -> Rig {
        let cfg = Arc::new(cfg);
        let clock = ClockService::new();
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let store = ScheduleStore::new(cfg.breaker.clone());
        let coordinator = RefreshCoordinator::new(Arc::clone(&cfg), clock.clone(), bus.clone());

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let fetch = FetchFn::arc(move |_id: String, _reason| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                match behavior {
                    Behavior::Succeed => Ok(()),
                    Behavior::FailRemote => Err(FetchError::Remote {
                        error: "HTTP 500".into(),
                    }),
                    Behavior::FailNetwork => Err(FetchError::Network {
                        error: "connection refused".into(),
                    }),
                }
            }
        });

        let scheduler = Scheduler::new(
            cfg,
            clock,
            bus,
            store.clone(),
            coordinator,
            fetch,
            CancellationToken::new(),
        );
        Rig {
            scheduler,
            store,
            calls,
        }
    }

    fn descriptor(id: &str, interval: IntervalSpec) -> SourceDescriptor {
        SourceDescriptor {
            source_id: id.into(),
            source_type: "rss".into(),
            refresh: RefreshOptions::every(interval),
        }
    }

    fn online() -> NetworkState {
        NetworkState {
            is_online: true,
            quality: NetworkQuality::Good,
            vpn_active: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_refreshed_source_fires_promptly() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        r.scheduler
            .schedule_source(descriptor("feed", IntervalSpec::Text("1 minute".into())))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 1);

        let s = r.store.schedule("feed").await.unwrap();
        assert!(s.last_refresh.is_some());
        assert!(s.next_refresh.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_descriptors_are_rejected_synchronously() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        assert!(matches!(
            r.scheduler
                .schedule_source(descriptor("  ", IntervalSpec::Minutes(1)))
                .await,
            Err(ScheduleError::EmptySourceId)
        ));
        assert!(matches!(
            r.scheduler
                .schedule_source(descriptor("feed", IntervalSpec::Text("whenever".into())))
                .await,
            Err(ScheduleError::InvalidInterval { .. })
        ));
        assert!(matches!(
            r.scheduler
                .schedule_source(descriptor("feed", IntervalSpec::Text("1 second".into())))
                .await,
            Err(ScheduleError::IntervalOutOfRange { .. })
        ));
        assert!(r.store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_change_anchors_at_now_instead_of_going_overdue() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        let now = r.scheduler.clock.now_ms();

        let mut d = descriptor("feed", IntervalSpec::Text("5 minutes".into()));
        d.refresh.last_refresh = Some(now - 3 * 60_000);
        r.scheduler.schedule_source(d).await.unwrap();

        let next_before = r.store.schedule("feed").await.unwrap().next_refresh.unwrap();
        assert!(next_before >= now + 110_000, "expected ~2min out");

        // Shrink 5min → 1min: 3min-old data must not be "overdue".
        let mut d = descriptor("feed", IntervalSpec::Text("1 minute".into()));
        d.refresh.last_refresh = None;
        r.scheduler.schedule_source(d).await.unwrap();

        let s = r.store.schedule("feed").await.unwrap();
        let next = s.next_refresh.unwrap();
        assert!(next >= now + 55_000, "next fire anchored at now + 1min");
        assert_eq!(s.last_refresh, Some(now - 3 * 60_000), "history preserved");

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 0, "no immediate fire");
    }

    #[tokio::test(start_paused = true)]
    async fn offline_schedule_survives_and_fires_once_on_recovery() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        r.scheduler.set_network_state(NetworkState::offline()).await;
        tokio::time::sleep(Duration::from_secs(1)).await; // debounce

        r.scheduler
            .schedule_source(descriptor("feed", IntervalSpec::Text("1 minute".into())))
            .await
            .unwrap();
        let stored = r.store.schedule("feed").await.unwrap();
        assert!(stored.next_refresh.is_some(), "schedule survives offline");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 0, "no fetch while offline");

        r.scheduler.set_network_state(online()).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 1, "exactly one catch-up fire");

        // Normal interval scheduling resumes; nothing extra fires early.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_catch_up_is_staggered() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        r.scheduler.set_network_state(NetworkState::offline()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        for i in 0..10 {
            r.scheduler
                .schedule_source(descriptor(
                    &format!("feed-{i}"),
                    IntervalSpec::Text("10 minutes".into()),
                ))
                .await
                .unwrap();
        }
        r.scheduler.set_network_state(online()).await;

        // stagger = min(5s, 30s / 10) = 3s: only the first fires right away.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 1, "not all in the same tick");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 10, "all caught up");
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_failures_unschedule_the_source() {
        let cfg = RefreshConfig {
            max_consecutive_failures: 2,
            ..RefreshConfig::default()
        };
        let r = rig(cfg, Behavior::FailRemote);
        r.scheduler
            .schedule_source(descriptor("feed", IntervalSpec::Text("1 minute".into())))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 2, "budget of 2 attempts");
        assert!(
            r.store.schedule("feed").await.is_none(),
            "fatally unscheduled"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_do_not_touch_the_failure_budget() {
        let cfg = RefreshConfig {
            max_consecutive_failures: 2,
            ..RefreshConfig::default()
        };
        let r = rig(cfg, Behavior::FailNetwork);
        r.scheduler
            .schedule_source(descriptor("feed", IntervalSpec::Text("1 minute".into())))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(r.calls.load(Ordering::SeqCst) >= 3, "keeps retrying");
        let s = r.store.schedule("feed").await.expect("still scheduled");
        assert_eq!(s.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_timer() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        // Two quick re-registrations: only one timer must be live.
        r.scheduler
            .schedule_source(descriptor("feed", IntervalSpec::Text("1 minute".into())))
            .await
            .unwrap();
        r.scheduler
            .schedule_source(descriptor("feed", IntervalSpec::Text("1 minute".into())))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 1, "single first fire");
    }

    #[tokio::test(start_paused = true)]
    async fn unschedule_clears_the_timer() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        r.scheduler
            .schedule_source(descriptor("feed", IntervalSpec::Text("1 minute".into())))
            .await
            .unwrap();
        assert!(r.scheduler.unschedule_source("feed").await);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 0);
        assert!(r.store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_descriptor_unschedules() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        r.scheduler
            .schedule_source(descriptor("feed", IntervalSpec::Text("1 minute".into())))
            .await
            .unwrap();

        let mut d = descriptor("feed", IntervalSpec::Text("1 minute".into()));
        d.refresh.enabled = false;
        r.scheduler.schedule_source(d).await.unwrap();
        assert!(r.store.schedule("feed").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_triggers_a_rate_limited_subset() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        let now = r.scheduler.clock.now_ms();

        // Three long-overdue sources whose timers were "lost".
        for i in 0..3 {
            let mut d = descriptor(&format!("feed-{i}"), IntervalSpec::Text("1 minute".into()));
            d.refresh.last_refresh = Some(now - 10 * 60_000);
            r.scheduler.schedule_source(d).await.unwrap();
        }
        r.scheduler.clear_all_timers().await;

        r.scheduler.sweep_overdue().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            r.calls.load(Ordering::SeqCst),
            2,
            "sweep caps concurrent triggers"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_all_submits_every_enabled_source() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        r.scheduler.set_network_state(NetworkState::offline()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        for i in 0..4 {
            r.scheduler
                .schedule_source(descriptor(
                    &format!("feed-{i}"),
                    IntervalSpec::Text("10 minutes".into()),
                ))
                .await
                .unwrap();
        }
        let submitted = r.scheduler.refresh_all(RefreshReason::Batch).await;
        assert_eq!(submitted, 4);
        assert_eq!(r.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn destroyed_scheduler_arms_nothing() {
        let r = rig(RefreshConfig::default(), Behavior::Succeed);
        r.scheduler.destroy().await;
        assert!(matches!(
            r.scheduler
                .schedule_source(descriptor("feed", IntervalSpec::Minutes(1)))
                .await,
            Err(ScheduleError::Destroyed)
        ));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(r.calls.load(Ordering::SeqCst), 0);
    }
}
