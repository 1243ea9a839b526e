//! # RefreshCoordinator: the single execution gate.
//!
//! Every refresh — timer-driven, manual, catch-up, sweep, or batch — flows
//! through [`RefreshCoordinator::execute`]. The coordinator guarantees:
//!
//! - **Per-source serialization**: at most one refresh in flight per source
//!   id; a second request either skips or queues behind the first.
//! - **Bounded queues**: each source's FIFO holds at most
//!   `queue_capacity` requests; overflow rejects the oldest entry.
//! - **Global cap**: a semaphore bounds total parallelism so a burst of due
//!   sources cannot saturate the transport.
//! - **Timeout race**: an execution that does not settle in time is treated
//!   as failed; the underlying future is dropped, not awaited further.
//! - **Drain on completion**: finishing a refresh hands the still-held
//!   active slot directly to the next queued request (FIFO), so the
//!   serialization invariant never has a gap.
//!
//! ## Event flow
//! ```text
//! execute(id, op)
//!   ├─ slot free ──► RefreshStarting → [op] → RefreshCompleted
//!   │                                        → RefreshTimedOut + RefreshFailed
//!   │                                        → RefreshFailed
//!   ├─ slot busy, skip_if_active ──► RefreshSkipped
//!   └─ slot busy, queueing ──► (waits; oldest may get QueueDropped)
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{oneshot, Mutex, Notify, Semaphore};

use crate::clock::ClockService;
use crate::config::RefreshConfig;
use crate::coordinator::metrics::MetricsInner;
use crate::coordinator::queue::QueuedRequest;
use crate::coordinator::{RefreshMetrics, RefreshOp};
use crate::error::FetchError;
use crate::events::{Bus, Event, EventKind};
use crate::sync::{with_lock, with_permit, ActiveSet};

/// Per-call execution knobs.
#[derive(Clone, Copy, Debug)]
pub struct ExecuteOptions {
    /// `true`: return [`RefreshOutcome::Skipped`] when the source is already
    /// refreshing. `false`: enqueue behind the in-flight operation.
    pub skip_if_active: bool,
    /// Per-execution timeout (`None` = no timeout).
    pub timeout: Option<Duration>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            skip_if_active: true,
            timeout: None,
        }
    }
}

/// Batch execution knobs for "refresh all" style requests.
#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    /// Chunk size; each chunk is fully awaited before the next starts.
    pub max_concurrent: usize,
    /// `false`: stop after the first chunk containing a failure.
    pub continue_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            continue_on_error: true,
        }
    }
}

/// What happened to one refresh request.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The fetch callback settled successfully.
    Completed {
        /// Wall time the execution took.
        elapsed: Duration,
    },
    /// The fetch callback failed (or timed out).
    Failed {
        /// The failure, timeout included.
        error: FetchError,
        /// Wall time until the failure was observed.
        elapsed: Duration,
    },
    /// Not executed: the source was already refreshing.
    Skipped,
    /// Not executed: rejected by the queue bound (oldest entry).
    Dropped,
    /// Not executed: the queue was discarded (unschedule or teardown).
    Cancelled,
}

impl RefreshOutcome {
    /// True only for [`RefreshOutcome::Completed`].
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Completed { .. })
    }

    /// The failure, when there was one.
    pub fn error(&self) -> Option<&FetchError> {
        match self {
            RefreshOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// The execution gate. Shared by the scheduler and the manager facade.
pub struct RefreshCoordinator {
    cfg: Arc<RefreshConfig>,
    clock: ClockService,
    bus: Bus,
    active: ActiveSet,
    queues: Mutex<HashMap<String, VecDeque<QueuedRequest>>>,
    semaphore: Option<Arc<Semaphore>>,
    metrics: StdMutex<MetricsInner>,
    settled: Notify,
}

impl RefreshCoordinator {
    /// Creates a coordinator; the semaphore comes from
    /// `cfg.concurrency_limit()` (`None` = unbounded).
    pub fn new(cfg: Arc<RefreshConfig>, clock: ClockService, bus: Bus) -> Arc<Self> {
        let semaphore = cfg.concurrency_limit().map(|n| Arc::new(Semaphore::new(n)));
        Arc::new(Self {
            cfg,
            clock,
            bus,
            active: ActiveSet::new(),
            queues: Mutex::new(HashMap::new()),
            semaphore,
            metrics: StdMutex::new(MetricsInner::default()),
            settled: Notify::new(),
        })
    }

    /// Executes (or skips/queues) one refresh for `source_id`.
    pub async fn execute<F, Fut>(
        self: &Arc<Self>,
        source_id: &str,
        op: F,
        opts: ExecuteOptions,
    ) -> RefreshOutcome
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), FetchError>> + Send + 'static,
    {
        let boxed: RefreshOp = Box::new(move || Box::pin(op()));
        self.execute_boxed(source_id, boxed, opts).await
    }

    /// Boxed-op variant used internally and by batch execution.
    pub async fn execute_boxed(
        self: &Arc<Self>,
        source_id: &str,
        op: RefreshOp,
        opts: ExecuteOptions,
    ) -> RefreshOutcome {
        self.metrics_lock().record_submitted();

        if self.active.try_insert(source_id).await {
            return self.run_slot(source_id, op, opts.timeout).await;
        }

        if opts.skip_if_active {
            self.metrics_lock().record_skip();
            self.bus.publish(
                Event::now(EventKind::RefreshSkipped)
                    .with_source(source_id)
                    .with_reason("already refreshing"),
            );
            return RefreshOutcome::Skipped;
        }

        self.enqueue(source_id, op, opts.timeout).await
    }

    /// Chunked execution for "refresh all sources" requests.
    ///
    /// Each chunk is fully awaited before the next starts. With
    /// `continue_on_error = false` the remaining chunks are abandoned after
    /// the first chunk that contains a failure.
    pub async fn execute_batch(
        self: &Arc<Self>,
        ops: Vec<(String, RefreshOp)>,
        opts: BatchOptions,
        each: ExecuteOptions,
    ) -> Vec<RefreshOutcome> {
        let chunk_size = opts.max_concurrent.max(1);
        let mut outcomes = Vec::with_capacity(ops.len());
        let mut remaining = ops.into_iter();

        loop {
            let chunk: Vec<(String, RefreshOp)> = remaining.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let futures = chunk
                .into_iter()
                .map(|(id, op)| {
                    let me = Arc::clone(self);
                    async move { me.execute_boxed(&id, op, each).await }
                })
                .collect::<Vec<_>>();
            let settled = join_all(futures).await;

            let failed = settled
                .iter()
                .any(|o| matches!(o, RefreshOutcome::Failed { .. }));
            outcomes.extend(settled);
            if failed && !opts.continue_on_error {
                break;
            }
        }
        outcomes
    }

    /// Discards every queued request for `source_id`, resolving each with
    /// [`RefreshOutcome::Cancelled`]. The in-flight refresh, if any, is not
    /// aborted.
    pub async fn cancel_queued(&self, source_id: &str) {
        let drained = with_lock(&self.queues, |queues| {
            queues.remove(source_id).unwrap_or_default()
        })
        .await;
        for req in drained {
            let _ = req.tx.send(RefreshOutcome::Cancelled);
        }
    }

    /// Teardown: close the semaphore (pending acquisitions fail) and cancel
    /// every queue.
    pub async fn close(&self) {
        if let Some(sem) = &self.semaphore {
            sem.close();
        }
        let all = with_lock(&self.queues, std::mem::take).await;
        for (_, reqs) in all {
            for req in reqs {
                let _ = req.tx.send(RefreshOutcome::Cancelled);
            }
        }
    }

    /// Waits up to `grace` for every in-flight refresh to settle.
    ///
    /// Returns the sorted ids still mid-refresh when the grace expires.
    pub async fn wait_idle(&self, grace: Duration) -> Result<(), Vec<String>> {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let settled = self.settled.notified();
            if self.active.is_empty().await {
                return Ok(());
            }
            tokio::select! {
                _ = settled => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(self.active.snapshot().await);
                }
            }
        }
    }

    /// True when `source_id` has a refresh in flight.
    pub async fn is_active(&self, source_id: &str) -> bool {
        self.active.contains(source_id).await
    }

    /// Number of refreshes in flight.
    pub async fn active_count(&self) -> usize {
        self.active.len().await
    }

    /// Current metrics snapshot.
    pub fn metrics(&self) -> RefreshMetrics {
        self.metrics_lock().snapshot()
    }

    // ---------------------------
    // Internals
    // ---------------------------

    /// Runs an operation that already owns the active slot for `source_id`,
    /// then releases the slot or hands it to the next queued request.
    async fn run_slot(
        self: &Arc<Self>,
        source_id: &str,
        op: RefreshOp,
        timeout: Option<Duration>,
    ) -> RefreshOutcome {
        let outcome = match &self.semaphore {
            Some(sem) => with_permit(sem, self.run_timed(source_id, op, timeout))
                .await
                .unwrap_or(RefreshOutcome::Cancelled),
            None => self.run_timed(source_id, op, timeout).await,
        };
        self.record(&outcome);
        self.release_slot(source_id).await;
        outcome
    }

    /// One timed execution with lifecycle events; no slot bookkeeping.
    async fn run_timed(
        &self,
        source_id: &str,
        op: RefreshOp,
        timeout: Option<Duration>,
    ) -> RefreshOutcome {
        self.bus
            .publish(Event::now(EventKind::RefreshStarting).with_source(source_id));
        let start = self.clock.monotonic();

        let res = match timeout.filter(|t| *t > Duration::ZERO) {
            Some(t) => match tokio::time::timeout(t, op()).await {
                Ok(r) => r,
                Err(_elapsed) => {
                    self.bus.publish(
                        Event::now(EventKind::RefreshTimedOut)
                            .with_source(source_id)
                            .with_timeout(t),
                    );
                    Err(FetchError::Timeout { timeout: t })
                }
            },
            None => op().await,
        };
        let elapsed = start.elapsed();

        match res {
            Ok(()) => {
                self.bus
                    .publish(Event::now(EventKind::RefreshCompleted).with_source(source_id));
                RefreshOutcome::Completed { elapsed }
            }
            Err(error) => {
                self.bus.publish(
                    Event::now(EventKind::RefreshFailed)
                        .with_source(source_id)
                        .with_reason(error.to_string()),
                );
                RefreshOutcome::Failed { error, elapsed }
            }
        }
    }

    /// Appends a request to the source's bounded FIFO and awaits its
    /// resolution. Overflow rejects the oldest queued entry.
    async fn enqueue(
        self: &Arc<Self>,
        source_id: &str,
        op: RefreshOp,
        timeout: Option<Duration>,
    ) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();
        let request = QueuedRequest { op, timeout, tx };
        let capacity = self.cfg.queue_capacity.max(1);

        let dropped = with_lock(&self.queues, |queues| {
            let queue = queues.entry(source_id.to_string()).or_default();
            let dropped = if queue.len() >= capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(request);
            dropped
        })
        .await;

        if let Some(old) = dropped {
            self.metrics_lock().record_drop();
            self.bus.publish(
                Event::now(EventKind::QueueDropped)
                    .with_source(source_id)
                    .with_reason("queue full; oldest rejected"),
            );
            let _ = old.tx.send(RefreshOutcome::Dropped);
        }

        // If the slot freed while we were enqueueing, adopt it and drain.
        if self.active.try_insert(source_id).await {
            self.release_slot(source_id).await;
        }

        rx.await.unwrap_or(RefreshOutcome::Cancelled)
    }

    /// Called while holding the active slot: hands the slot to the next
    /// queued request (FIFO), or releases it.
    ///
    /// An enqueue can race the release — push after the queue pop, claim
    /// attempt before the slot removal — so after releasing, a pending
    /// request re-claims the slot and the loop pops it.
    async fn release_slot(self: &Arc<Self>, source_id: &str) {
        loop {
            let next = with_lock(&self.queues, |queues| match queues.get_mut(source_id) {
                Some(q) => {
                    let next = q.pop_front();
                    if q.is_empty() {
                        queues.remove(source_id);
                    }
                    next
                }
                None => None,
            })
            .await;

            if let Some(req) = next {
                self.spawn_hand_off(source_id.to_string(), req);
                return;
            }

            self.active.remove(source_id).await;
            self.settled.notify_waiters();

            let pending = with_lock(&self.queues, |queues| {
                queues.get(source_id).is_some_and(|q| !q.is_empty())
            })
            .await;
            if !pending || !self.active.try_insert(source_id).await {
                return;
            }
            // Claimed again with pending work; loop around to pop it.
        }
    }

    fn spawn_hand_off(self: &Arc<Self>, source_id: String, req: QueuedRequest) {
        let me = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = me.run_slot(&source_id, req.op, req.timeout).await;
            let _ = req.tx.send(outcome);
        });
    }

    fn record(&self, outcome: &RefreshOutcome) {
        let mut m = self.metrics_lock();
        match outcome {
            RefreshOutcome::Completed { elapsed } => m.record_success(*elapsed),
            RefreshOutcome::Failed { error, elapsed } => {
                m.record_failure(*elapsed, matches!(error, FetchError::Timeout { .. }));
            }
            _ => {}
        }
    }

    fn metrics_lock(&self) -> std::sync::MutexGuard<'_, MetricsInner> {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator(cfg: RefreshConfig) -> Arc<RefreshCoordinator> {
        RefreshCoordinator::new(Arc::new(cfg), ClockService::new(), Bus::new(64))
    }

    fn tracking_op(
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        hold: Duration,
    ) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<(), FetchError>> + Send + 'static
    {
        move || {
            Box::pin(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(hold).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_source_never_runs_twice_concurrently() {
        let co = coordinator(RefreshConfig::default());
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let co = Arc::clone(&co);
            let op = tracking_op(current.clone(), peak.clone(), Duration::from_millis(50));
            handles.push(tokio::spawn(async move {
                co.execute(
                    "feed",
                    op,
                    ExecuteOptions {
                        skip_if_active: false,
                        timeout: None,
                    },
                )
                .await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_success());
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_if_active_returns_skipped() {
        let co = coordinator(RefreshConfig::default());
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let first = {
            let co = Arc::clone(&co);
            let op = tracking_op(current.clone(), peak.clone(), Duration::from_millis(100));
            tokio::spawn(async move {
                co.execute("feed", op, ExecuteOptions::default()).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = co
            .execute("feed", || async { Ok(()) }, ExecuteOptions::default())
            .await;
        assert!(matches!(second, RefreshOutcome::Skipped));
        assert!(first.await.unwrap().is_success());
        assert_eq!(co.metrics().skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_bound_rejects_oldest() {
        let cfg = RefreshConfig {
            queue_capacity: 2,
            ..RefreshConfig::default()
        };
        let co = coordinator(cfg);
        let opts = ExecuteOptions {
            skip_if_active: false,
            timeout: None,
        };

        // Occupy the slot.
        let holder = {
            let co = Arc::clone(&co);
            tokio::spawn(async move {
                co.execute(
                    "feed",
                    || async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok(())
                    },
                    ExecuteOptions {
                        skip_if_active: false,
                        timeout: None,
                    },
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Three queued requests against capacity 2: the first gets dropped.
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let co = Arc::clone(&co);
            waiters.push(tokio::spawn(async move {
                co.execute("feed", || async { Ok(()) }, opts).await
            }));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let first = waiters.remove(0).await.unwrap();
        assert!(matches!(first, RefreshOutcome::Dropped));
        for w in waiters {
            assert!(w.await.unwrap().is_success());
        }
        assert!(holder.await.unwrap().is_success());
        assert_eq!(co.metrics().dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let co = coordinator(RefreshConfig::default());
        let outcome = co
            .execute(
                "slow",
                || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                },
                ExecuteOptions {
                    skip_if_active: true,
                    timeout: Some(Duration::from_millis(100)),
                },
            )
            .await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Failed {
                error: FetchError::Timeout { .. },
                ..
            }
        ));
        let m = co.metrics();
        assert_eq!(m.failed, 1);
        assert_eq!(m.timed_out, 1);
        assert!(!co.is_active("slow").await);
    }

    #[tokio::test(start_paused = true)]
    async fn global_semaphore_bounds_parallelism() {
        let cfg = RefreshConfig {
            max_concurrent: 2,
            ..RefreshConfig::default()
        };
        let co = coordinator(cfg);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..6 {
            let co = Arc::clone(&co);
            let op = tracking_op(current.clone(), peak.clone(), Duration::from_millis(20));
            handles.push(tokio::spawn(async move {
                co.execute(&format!("feed-{i}"), op, ExecuteOptions::default())
                    .await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_success());
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_chunks_and_bounds_concurrency() {
        let co = coordinator(RefreshConfig::default());
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let ops: Vec<(String, RefreshOp)> = (0..7)
            .map(|i| {
                let op = tracking_op(current.clone(), peak.clone(), Duration::from_millis(10));
                let boxed: RefreshOp = Box::new(op);
                (format!("feed-{i}"), boxed)
            })
            .collect();

        let outcomes = co
            .execute_batch(
                ops,
                BatchOptions {
                    max_concurrent: 2,
                    continue_on_error: true,
                },
                ExecuteOptions::default(),
            )
            .await;
        assert_eq!(outcomes.len(), 7);
        assert!(outcomes.iter().all(|o| o.is_success()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_stops_after_failing_chunk_when_asked() {
        let co = coordinator(RefreshConfig::default());
        let ops: Vec<(String, RefreshOp)> = (0..4)
            .map(|i| {
                let boxed: RefreshOp = Box::new(move || {
                    Box::pin(async move {
                        if i == 0 {
                            Err(FetchError::Remote {
                                error: "boom".into(),
                            })
                        } else {
                            Ok(())
                        }
                    })
                });
                (format!("feed-{i}"), boxed)
            })
            .collect();

        let outcomes = co
            .execute_batch(
                ops,
                BatchOptions {
                    max_concurrent: 2,
                    continue_on_error: false,
                },
                ExecuteOptions::default(),
            )
            .await;
        // First chunk of two ran; the rest were abandoned.
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_queued_resolves_waiters() {
        let co = coordinator(RefreshConfig::default());
        let holder = {
            let co = Arc::clone(&co);
            tokio::spawn(async move {
                co.execute(
                    "feed",
                    || async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(())
                    },
                    ExecuteOptions::default(),
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        let waiter = {
            let co = Arc::clone(&co);
            tokio::spawn(async move {
                co.execute(
                    "feed",
                    || async { Ok(()) },
                    ExecuteOptions {
                        skip_if_active: false,
                        timeout: None,
                    },
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        co.cancel_queued("feed").await;
        assert!(matches!(
            waiter.await.unwrap(),
            RefreshOutcome::Cancelled
        ));
        assert!(holder.await.unwrap().is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_reports_stuck_sources() {
        let co = coordinator(RefreshConfig::default());
        let _holder = {
            let co = Arc::clone(&co);
            tokio::spawn(async move {
                co.execute(
                    "stuck",
                    || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    },
                    ExecuteOptions::default(),
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        let res = co.wait_idle(Duration::from_millis(100)).await;
        assert_eq!(res.unwrap_err(), vec!["stuck".to_string()]);
    }
}
