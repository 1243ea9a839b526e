//! # RefreshManager: the thin facade wiring everything together.
//!
//! The manager owns no scheduling logic itself. It wires the clock service,
//! clock monitor, schedule store, coordinator and scheduler, fans bus events
//! out to subscribers, and exposes the host-facing API:
//!
//! ```text
//! RefreshManager::builder(cfg)
//!     .with_subscribers(subs)
//!     .build(fetch)                  // fetch: the host's transport callback
//!
//! manager.schedule_source(descriptor)
//! manager.unschedule_source("feed")
//! manager.trigger_refresh("feed", reason) / manual_refresh / refresh_all
//! manager.set_network_state(state)
//! manager.refresh_status("feed") / statistics()
//! manager.destroy()                  // bounded teardown
//! ```
//!
//! ## Teardown order
//! ```text
//! destroy():
//!   1. publish DestroyRequested
//!   2. unsubscribe the scheduler's clock watcher
//!   3. scheduler.destroy()      → sweep, monitor and timers stop
//!   4. coordinator.close()      → queued requests rejected
//!   5. wait_idle(grace)         → bounded wait for in-flight refreshes
//!   6. clear the store; publish AllSettledWithin / GraceExceeded
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::breaker::{BreakerState, BreakerStatus};
use crate::clock::{ClockMonitor, ClockService, WatchGuard};
use crate::config::RefreshConfig;
use crate::coordinator::{RefreshCoordinator, RefreshMetrics, RefreshOutcome};
use crate::error::{RuntimeError, ScheduleError};
use crate::events::{Bus, Event, EventKind};
use crate::fetch::{FetchRef, RefreshReason};
use crate::scheduler::{NetworkState, ScheduleStore, Scheduler, SourceDescriptor};
use crate::shutdown;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Read-only per-source status for display.
#[derive(Clone, Debug)]
pub struct RefreshStatus {
    /// Stable source identifier.
    pub source_id: String,
    /// True while a refresh is in flight.
    pub is_refreshing: bool,
    /// True when elapsed-since-last-success exceeds the interval.
    pub is_overdue: bool,
    /// Last successful completion (ms epoch).
    pub last_refresh: Option<u64>,
    /// Computed next fire (ms epoch).
    pub next_refresh: Option<u64>,
    /// Validated refresh interval.
    pub interval: Duration,
    /// Consecutive non-network failures.
    pub failure_count: u32,
    /// Circuit state of the paired breaker.
    pub breaker: BreakerState,
}

/// Aggregated runtime statistics for display.
#[derive(Clone, Debug)]
pub struct RefreshStatistics {
    /// Registered source count.
    pub scheduled_sources: usize,
    /// Refreshes currently in flight.
    pub active_refreshes: usize,
    /// Last host-reported network state.
    pub network: NetworkState,
    /// Coordinator counters.
    pub metrics: RefreshMetrics,
}

/// Builder for constructing a manager with optional subscribers.
pub struct RefreshManagerBuilder {
    cfg: RefreshConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RefreshManagerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: RefreshConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Builds the runtime around the host's fetch callback and starts the
    /// background loops (sweep, clock monitor, subscriber fan-out).
    pub fn build(self, fetch: FetchRef) -> Arc<RefreshManager> {
        let cfg = Arc::new(self.cfg);
        let clock = ClockService::new();
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers));
        let runtime_token = CancellationToken::new();

        let store = ScheduleStore::new(cfg.breaker.clone());
        let coordinator = RefreshCoordinator::new(Arc::clone(&cfg), clock.clone(), bus.clone());
        let scheduler = Scheduler::new(
            Arc::clone(&cfg),
            clock.clone(),
            bus.clone(),
            store.clone(),
            Arc::clone(&coordinator),
            fetch,
            runtime_token.clone(),
        );
        let monitor = ClockMonitor::new(cfg.monitor.clone(), clock.clone(), bus.clone());

        subscriber_listener(&bus, Arc::clone(&subs), runtime_token.clone());
        scheduler.run();
        monitor.run(runtime_token.clone());
        let watch_guard = monitor.watch(scheduler.clock_watch());

        Arc::new(RefreshManager {
            cfg,
            clock,
            bus,
            store,
            coordinator,
            scheduler,
            monitor,
            watch_guard: StdMutex::new(Some(watch_guard)),
            destroyed: AtomicBool::new(false),
        })
    }
}

/// The host-facing facade. Owns the wiring, none of the scheduling logic.
pub struct RefreshManager {
    cfg: Arc<RefreshConfig>,
    clock: ClockService,
    bus: Bus,
    store: ScheduleStore,
    coordinator: Arc<RefreshCoordinator>,
    scheduler: Arc<Scheduler>,
    #[allow(dead_code)]
    monitor: Arc<ClockMonitor>,
    watch_guard: StdMutex<Option<WatchGuard>>,
    destroyed: AtomicBool,
}

impl RefreshManager {
    /// Starts a builder.
    pub fn builder(cfg: RefreshConfig) -> RefreshManagerBuilder {
        RefreshManagerBuilder::new(cfg)
    }

    /// Registers or updates a source. Invalid descriptors are rejected here,
    /// synchronously, and leave nothing scheduled.
    pub async fn schedule_source(&self, descriptor: SourceDescriptor) -> Result<(), ScheduleError> {
        self.scheduler.schedule_source(descriptor).await
    }

    /// Removes a source. Returns whether it was registered.
    pub async fn unschedule_source(&self, source_id: &str) -> bool {
        self.scheduler.unschedule_source(source_id).await
    }

    /// Triggers one refresh. `None` when the trigger was a no-op (unknown,
    /// disabled, already refreshing, exhausted, or backing off).
    pub async fn trigger_refresh(
        &self,
        source_id: &str,
        reason: RefreshReason,
    ) -> Option<RefreshOutcome> {
        self.scheduler.trigger_refresh(source_id, reason).await
    }

    /// Host-requested refresh that bypasses the circuit-breaker gate: a
    /// success resets the circuit, a failure is recorded normally.
    pub async fn manual_refresh(&self, source_id: &str) -> Option<RefreshOutcome> {
        self.scheduler
            .trigger_refresh(source_id, RefreshReason::Manual)
            .await
    }

    /// Chunked refresh of every registered source. Returns the number of
    /// sources submitted.
    pub async fn refresh_all(&self, reason: RefreshReason) -> usize {
        self.scheduler.refresh_all(reason).await
    }

    /// Host-pushed network transition.
    pub async fn set_network_state(&self, state: NetworkState) {
        self.scheduler.set_network_state(state).await;
    }

    /// Read-only status for one source.
    pub async fn refresh_status(&self, source_id: &str) -> Option<RefreshStatus> {
        let schedule = self.store.schedule(source_id).await?;
        let now = self.clock.now_ms();
        let breaker = match self.store.peek_breaker(source_id).await {
            Some(b) => b.state(),
            None => BreakerState::Closed,
        };
        Some(RefreshStatus {
            is_refreshing: self.coordinator.is_active(source_id).await,
            is_overdue: schedule.is_overdue(now),
            last_refresh: schedule.last_refresh,
            next_refresh: schedule.next_refresh,
            interval: schedule.interval,
            failure_count: schedule.failure_count,
            source_id: schedule.source_id,
            breaker,
        })
    }

    /// Breaker diagnostics for one source: state, time until the next
    /// attempt, and the bounded backoff history.
    pub async fn breaker_status(&self, source_id: &str) -> Option<BreakerStatus> {
        let breaker = self.store.peek_breaker(source_id).await?;
        Some(breaker.status(self.clock.now_ms()))
    }

    /// Aggregated runtime statistics.
    pub async fn statistics(&self) -> RefreshStatistics {
        RefreshStatistics {
            scheduled_sources: self.store.len().await,
            active_refreshes: self.coordinator.active_count().await,
            network: self.scheduler.network(),
            metrics: self.coordinator.metrics(),
        }
    }

    /// A receiver observing every runtime event published after this call.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Bounded teardown: stop timers, sweeps and the clock monitor, reject
    /// queued requests, wait up to the configured grace for in-flight
    /// refreshes, then clear all state.
    ///
    /// Idempotent; the second call is a no-op.
    pub async fn destroy(&self) -> Result<(), RuntimeError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.bus.publish(Event::now(EventKind::DestroyRequested));

        let guard = {
            let mut slot = self.watch_guard.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(guard) = guard {
            guard.unsubscribe();
        }

        self.scheduler.destroy().await;
        self.coordinator.close().await;
        let settled = self.coordinator.wait_idle(self.cfg.grace).await;
        self.store.clear().await;

        match settled {
            Ok(()) => {
                self.bus.publish(Event::now(EventKind::AllSettledWithin));
                Ok(())
            }
            Err(stuck) => {
                self.bus.publish(Event::now(EventKind::GraceExceeded));
                Err(RuntimeError::GraceExceeded {
                    grace: self.cfg.grace,
                    stuck,
                })
            }
        }
    }

    /// Convenience for host binaries: blocks until an OS termination signal,
    /// then runs [`RefreshManager::destroy`].
    pub async fn run_until_shutdown(&self) -> Result<(), RuntimeError> {
        let _ = shutdown::wait_for_shutdown_signal().await;
        self.destroy().await
    }
}

/// Subscribes to the bus and forwards events to the subscriber set
/// (fire-and-forget fan-out).
fn subscriber_listener(bus: &Bus, subs: Arc<SubscriberSet>, token: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(&ev),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                },
            }
        }
    });
}
