//! # ActiveSet: membership set with atomic insert-if-absent.
//!
//! Tracks which source ids currently have a refresh in flight. The whole
//! design hinges on [`ActiveSet::try_insert`] being atomic: two concurrent
//! triggers for the same source race on one lock, and exactly one wins.
//!
//! ## Rules
//! - A member stays in the set for the minimal duration of its in-flight
//!   refresh and never appears twice.
//! - `snapshot` is sorted for deterministic reporting (teardown diagnostics).

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Async-safe set of in-flight source ids.
#[derive(Clone, Default)]
pub struct ActiveSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ActiveSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `id` if absent. Returns `true` when this call won the slot,
    /// `false` when the id was already a member.
    pub async fn try_insert(&self, id: &str) -> bool {
        self.inner.lock().await.insert(id.to_string())
    }

    /// Removes `id`. Returns `true` when it was a member.
    pub async fn remove(&self, id: &str) -> bool {
        self.inner.lock().await.remove(id)
    }

    /// True when `id` is currently a member.
    pub async fn contains(&self, id: &str) -> bool {
        self.inner.lock().await.contains(id)
    }

    /// Number of members.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// True when no refresh is in flight.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Returns the sorted member list.
    pub async fn snapshot(&self) -> Vec<String> {
        let set = self.inner.lock().await;
        let mut ids: Vec<String> = set.iter().cloned().collect();
        ids.sort_unstable();
        ids
    }
}
