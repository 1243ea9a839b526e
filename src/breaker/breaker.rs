//! # CircuitBreaker: per-source failure isolation.
//!
//! All state transitions are driven by explicit millisecond timestamps so a
//! breaker can be exercised against any synthetic timeline in tests; callers
//! pass `clock.now_ms()`.
//!
//! ## Rules
//! - `can_attempt` performs the Open → HalfOpen transition itself the first
//!   time it is called past `next_attempt_at`.
//! - A HalfOpen failure reopens immediately — no multi-attempt grace — and
//!   the cumulative backoff level is preserved.
//! - The reset timeout is always bounded by `[base_timeout, max_timeout]`,
//!   jitter included.
//! - Lock discipline: the internal mutex is never held across an await.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::breaker::{BackoffRecord, BreakerConfig, BreakerState, BreakerStatus};
use crate::clock::ClockService;

/// Rejection returned by [`CircuitBreaker::execute`] while the circuit is
/// open: the callback was **not** invoked.
#[derive(Error, Debug, Clone, Copy)]
#[error("circuit open; retry in {retry_after:?}")]
pub struct CircuitOpen {
    /// Time until the next attempt is allowed.
    pub retry_after: Duration,
}

struct BreakerCore {
    state: BreakerState,
    failure_count: u32,
    consecutive_openings: u32,
    next_attempt_at_ms: Option<u64>,
    reset_timeout: Duration,
    last_success_ms: Option<u64>,
    history: VecDeque<BackoffRecord>,
}

/// Per-source circuit breaker.
pub struct CircuitBreaker {
    cfg: BreakerConfig,
    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(cfg: BreakerConfig) -> Self {
        let reset_timeout = cfg.base_timeout;
        Self {
            cfg,
            core: Mutex::new(BreakerCore {
                state: BreakerState::Closed,
                failure_count: 0,
                consecutive_openings: 0,
                next_attempt_at_ms: None,
                reset_timeout,
                last_success_ms: None,
                history: VecDeque::new(),
            }),
        }
    }

    /// Current state (HalfOpen only after `can_attempt` observed the window
    /// passing).
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Whether an attempt is allowed at `now_ms`.
    ///
    /// While Open, the first call past `next_attempt_at` flips the breaker to
    /// HalfOpen and returns `true`; earlier calls return `false`.
    pub fn can_attempt(&self, now_ms: u64) -> bool {
        let mut core = self.lock();
        match core.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let due = core.next_attempt_at_ms.map_or(true, |t| now_ms >= t);
                if due {
                    core.state = BreakerState::HalfOpen;
                }
                due
            }
        }
    }

    /// Records a successful attempt; returns the resulting state.
    ///
    /// A success arriving more than `decay_after` since the previous success
    /// halves the opening counter instead of resetting it.
    pub fn record_success(&self, now_ms: u64) -> BreakerState {
        let mut core = self.lock();
        let long_gap = core
            .last_success_ms
            .map_or(core.consecutive_openings > 0, |t| {
                now_ms.saturating_sub(t) > self.cfg.decay_after.as_millis() as u64
            });

        core.state = BreakerState::Closed;
        core.failure_count = 0;
        core.next_attempt_at_ms = None;
        core.last_success_ms = Some(now_ms);
        if long_gap {
            core.consecutive_openings /= 2;
        } else {
            core.consecutive_openings = 0;
        }
        core.state
    }

    /// Records a failed attempt; returns the resulting state so the caller
    /// can publish an opening event exactly when the transition happens.
    pub fn record_failure(&self, now_ms: u64) -> BreakerState {
        let mut core = self.lock();
        core.failure_count = core.failure_count.saturating_add(1);
        match core.state {
            BreakerState::HalfOpen => self.open(&mut core, now_ms),
            BreakerState::Closed => {
                if core.failure_count >= self.cfg.failure_threshold {
                    self.open(&mut core, now_ms);
                }
            }
            // Bypass failures while Open are counted but never re-run the
            // opening logic.
            BreakerState::Open => {}
        }
        core.state
    }

    /// `Some(until)` while the breaker is holding attempts back.
    pub fn backoff_until(&self, now_ms: u64) -> Option<u64> {
        let core = self.lock();
        match core.state {
            BreakerState::Open => core.next_attempt_at_ms.filter(|t| *t > now_ms),
            _ => None,
        }
    }

    /// Read-only status snapshot.
    pub fn status(&self, now_ms: u64) -> BreakerStatus {
        let core = self.lock();
        let retry_after = match core.state {
            BreakerState::Open => core
                .next_attempt_at_ms
                .and_then(|t| t.checked_sub(now_ms))
                .map(Duration::from_millis),
            _ => None,
        };
        BreakerStatus {
            state: core.state,
            failure_count: core.failure_count,
            consecutive_openings: core.consecutive_openings,
            reset_timeout: core.reset_timeout,
            retry_after,
            history: core.history.iter().copied().collect(),
        }
    }

    /// Gated execution: rejects with [`CircuitOpen`] without invoking `f`
    /// while the window is closed; otherwise runs `f` and records the result.
    ///
    /// The outer `Err` means "not attempted"; the inner result is the
    /// callback's own outcome, already recorded.
    pub async fn execute<T, E, F, Fut>(
        &self,
        clock: &ClockService,
        f: F,
    ) -> Result<Result<T, E>, CircuitOpen>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let now = clock.now_ms();
        if !self.can_attempt(now) {
            let retry_after = self
                .backoff_until(now)
                .map(|t| Duration::from_millis(t - now))
                .unwrap_or_default();
            return Err(CircuitOpen { retry_after });
        }
        Ok(self.run_recorded(clock, f).await)
    }

    /// Manual-bypass execution: runs `f` even while Open. Success resets the
    /// circuit; failure is recorded normally.
    pub async fn execute_unchecked<T, E, F, Fut>(&self, clock: &ClockService, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_recorded(clock, f).await
    }

    async fn run_recorded<T, E, F, Fut>(&self, clock: &ClockService, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let res = f().await;
        let now = clock.now_ms();
        match &res {
            Ok(_) => {
                self.record_success(now);
            }
            Err(_) => {
                self.record_failure(now);
            }
        }
        res
    }

    /// Transition to Open: bump the opening counter, derive the jittered
    /// reset timeout, record it in the bounded history.
    fn open(&self, core: &mut BreakerCore, now_ms: u64) {
        core.state = BreakerState::Open;
        core.consecutive_openings = core.consecutive_openings.saturating_add(1);

        let level = core.consecutive_openings - 1;
        let timeout = self.reset_timeout_for(level);
        core.reset_timeout = timeout;
        core.next_attempt_at_ms = Some(now_ms.saturating_add(timeout.as_millis() as u64));

        core.history.push_back(BackoffRecord {
            at_ms: now_ms,
            level,
            timeout,
        });
        while core.history.len() > self.cfg.history_limit {
            core.history.pop_front();
        }
    }

    /// `min(base × multiplier^level, max)` ± jitter, clamped to
    /// `[base_timeout, max_timeout]`.
    fn reset_timeout_for(&self, level: u32) -> Duration {
        let base = self.cfg.base_timeout.as_secs_f64();
        let max = self.cfg.max_timeout.as_secs_f64();
        let exp = level.min(i32::MAX as u32) as i32;

        let raw = base * self.cfg.multiplier.powi(exp);
        let mut secs = if raw.is_finite() { raw.min(max) } else { max };

        if self.cfg.jitter > 0.0 {
            let j = self.cfg.jitter;
            let factor = 1.0 + rand::rng().random_range(-j..=j);
            secs *= factor;
        }
        Duration::from_secs_f64(secs.clamp(base, max))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }
}
