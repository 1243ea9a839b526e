//! # ScheduleStore: injected registry for schedules and breakers.
//!
//! An explicit store object owned by (and injected into) the scheduler
//! instance — no ambient singletons — so multiple independent scheduler
//! instances can coexist in tests.
//!
//! ## Rules
//! - The schedule map and breaker map are the only shared mutable schedule
//!   state; all mutation goes through [`GuardedMap`]'s atomic operations.
//! - Removing a source removes its breaker with it.

use std::sync::Arc;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::scheduler::Schedule;
use crate::sync::GuardedMap;

/// Shared store of per-source schedule and breaker state.
#[derive(Clone)]
pub struct ScheduleStore {
    schedules: GuardedMap<Schedule>,
    breakers: GuardedMap<Arc<CircuitBreaker>>,
    breaker_cfg: BreakerConfig,
}

impl ScheduleStore {
    /// Creates an empty store; `breaker_cfg` seeds every per-source breaker.
    pub fn new(breaker_cfg: BreakerConfig) -> Self {
        Self {
            schedules: GuardedMap::new(),
            breakers: GuardedMap::new(),
            breaker_cfg,
        }
    }

    /// Snapshot of one schedule.
    pub async fn schedule(&self, id: &str) -> Option<Schedule> {
        self.schedules.get(id).await
    }

    /// Inserts or replaces a schedule.
    pub async fn insert(&self, schedule: Schedule) {
        self.schedules
            .insert(schedule.source_id.clone(), schedule)
            .await;
    }

    /// Atomically mutates one schedule; `None` when the source is gone.
    pub async fn update<R>(&self, id: &str, f: impl FnOnce(&mut Schedule) -> R) -> Option<R> {
        self.schedules.update(id, f).await
    }

    /// Removes a source and its breaker. Returns the removed schedule.
    pub async fn remove(&self, id: &str) -> Option<Schedule> {
        self.breakers.remove(id).await;
        self.schedules.remove(id).await
    }

    /// True when the source is registered.
    pub async fn contains(&self, id: &str) -> bool {
        self.schedules.contains(id).await
    }

    /// Number of registered sources.
    pub async fn len(&self) -> usize {
        self.schedules.len().await
    }

    /// True when no sources are registered.
    pub async fn is_empty(&self) -> bool {
        self.schedules.is_empty().await
    }

    /// Sorted source ids.
    pub async fn ids(&self) -> Vec<String> {
        self.schedules.keys().await
    }

    /// Snapshot of every schedule, sorted by id.
    pub async fn snapshot(&self) -> Vec<Schedule> {
        self.schedules
            .entries()
            .await
            .into_iter()
            .map(|(_, s)| s)
            .collect()
    }

    /// The source's breaker, created on first use.
    pub async fn breaker(&self, id: &str) -> Arc<CircuitBreaker> {
        let cfg = self.breaker_cfg.clone();
        self.breakers
            .upsert(id, || Arc::new(CircuitBreaker::new(cfg)), |b| b.clone())
            .await
    }

    /// The source's breaker if one exists (no creation).
    pub async fn peek_breaker(&self, id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(id).await
    }

    /// Drops every schedule and breaker (teardown).
    pub async fn clear(&self) {
        self.schedules.clear().await;
        self.breakers.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Alignment;
    use std::time::Duration;

    fn schedule(id: &str) -> Schedule {
        Schedule {
            source_id: id.into(),
            source_type: "rss".into(),
            interval: Duration::from_secs(60),
            enabled: true,
            alignment: Alignment::none(),
            last_refresh: None,
            next_refresh: None,
            retry_count: 0,
            failure_count: 0,
        }
    }

    #[tokio::test]
    async fn breaker_is_created_once_per_source() {
        let store = ScheduleStore::new(BreakerConfig::default());
        let a = store.breaker("feed").await;
        let b = store.breaker("feed").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn remove_drops_breaker_with_schedule() {
        let store = ScheduleStore::new(BreakerConfig::default());
        store.insert(schedule("feed")).await;
        store.breaker("feed").await;
        assert!(store.contains("feed").await);

        assert!(store.remove("feed").await.is_some());
        assert!(store.peek_breaker("feed").await.is_none());
        assert!(!store.contains("feed").await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn independent_stores_do_not_share_state() {
        let a = ScheduleStore::new(BreakerConfig::default());
        let b = ScheduleStore::new(BreakerConfig::default());
        a.insert(schedule("feed")).await;
        assert!(b.schedule("feed").await.is_none());
    }
}
