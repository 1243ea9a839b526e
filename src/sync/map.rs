//! # GuardedMap: async keyed map with atomic check-then-act.
//!
//! A thin wrapper over `RwLock<HashMap<String, V>>` where every operation
//! resolves serially for a given key — two concurrent `update` calls for the
//! same key never interleave.
//!
//! ## Rules
//! - Reads (`get`, `contains`, `keys`) take the read lock and clone out.
//! - `update` holds the write lock for the whole closure (no await inside).
//! - The map is `Clone`; clones share the same underlying state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// Async-safe keyed map.
///
/// Values are cloned out on read; mutation goes through [`GuardedMap::update`]
/// or [`GuardedMap::upsert`], which run their closure under the write lock so
/// check-then-act sequences are atomic.
#[derive(Clone)]
pub struct GuardedMap<V> {
    inner: Arc<RwLock<HashMap<String, V>>>,
}

impl<V> Default for GuardedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> GuardedMap<V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Inserts a value, returning the previous one if present.
    pub async fn insert(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.inner.write().await.insert(key.into(), value)
    }

    /// Removes and returns the value for `key`.
    pub async fn remove(&self, key: &str) -> Option<V> {
        self.inner.write().await.remove(key)
    }

    /// True when `key` is present.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.contains_key(key)
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// True when the map holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Returns the keys, sorted for deterministic iteration.
    pub async fn keys(&self) -> Vec<String> {
        let map = self.inner.read().await;
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Runs `f` against the value for `key` under the write lock.
    ///
    /// Returns `None` when the key is absent; the closure never runs in that
    /// case. This is the atomic check-then-act primitive: no other operation
    /// on the map can interleave with `f`.
    pub async fn update<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let mut map = self.inner.write().await;
        map.get_mut(key).map(f)
    }

    /// Runs `f` against the value for `key`, inserting `default()` first if
    /// the key is absent. The whole sequence holds the write lock.
    pub async fn upsert<R>(
        &self,
        key: impl Into<String>,
        default: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> R {
        let mut map = self.inner.write().await;
        f(map.entry(key.into()).or_insert_with(default))
    }

    /// Removes every entry.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

impl<V: Clone> GuardedMap<V> {
    /// Returns a clone of the value for `key`.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.read().await.get(key).cloned()
    }

    /// Returns a snapshot of all entries, sorted by key.
    pub async fn entries(&self) -> Vec<(String, V)> {
        let map = self.inner.read().await;
        let mut entries: Vec<(String, V)> =
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_is_check_then_act() {
        let map: GuardedMap<u32> = GuardedMap::new();
        map.insert("a", 1).await;

        let bumped = map.update("a", |v| {
            *v += 1;
            *v
        });
        assert_eq!(bumped.await, Some(2));
        assert_eq!(map.update("missing", |v| *v).await, None);
    }

    #[tokio::test]
    async fn upsert_inserts_then_mutates() {
        let map: GuardedMap<Vec<u32>> = GuardedMap::new();
        map.upsert("q", Vec::new, |q| q.push(1)).await;
        map.upsert("q", Vec::new, |q| q.push(2)).await;
        assert_eq!(map.get("q").await, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn concurrent_updates_never_interleave() {
        let map: GuardedMap<u64> = GuardedMap::new();
        map.insert("n", 0).await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let map = map.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    map.update("n", |v| *v += 1).await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(map.get("n").await, Some(3200));
    }
}
