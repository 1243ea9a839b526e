//! Scoped semaphore and mutex helpers.
//!
//! `with_permit` runs a future while holding a semaphore permit; the permit
//! is released when the guard drops, even if the future panics. `with_lock`
//! runs a synchronous closure under a mutex for compound mutations (queue
//! push + overflow pop as one step).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

/// Acquires a permit from `sem`, runs `fut`, and releases the permit when
/// the scope ends (RAII — released even on panic).
///
/// Returns `None` when the semaphore is closed (runtime teardown).
pub async fn with_permit<T>(sem: &Arc<Semaphore>, fut: impl Future<Output = T>) -> Option<T> {
    let _permit = match sem.clone().acquire_owned().await {
        Ok(p) => p,
        Err(_closed) => return None,
    };
    Some(fut.await)
}

/// Runs `f` with exclusive access to the mutex contents.
///
/// The closure is synchronous: compound mutations complete in one critical
/// section with no await points inside.
pub async fn with_lock<T, R>(mutex: &Mutex<T>, f: impl FnOnce(&mut T) -> R) -> R {
    let mut guard = mutex.lock().await;
    f(&mut guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn permit_bounds_parallelism() {
        let sem = Arc::new(Semaphore::new(2));
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sem = sem.clone();
            let peak = peak.clone();
            let current = current.clone();
            handles.push(tokio::spawn(async move {
                with_permit(&sem, async {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn closed_semaphore_yields_none() {
        let sem = Arc::new(Semaphore::new(1));
        sem.close();
        assert_eq!(with_permit(&sem, async { 1 }).await, None);
    }

    #[tokio::test]
    async fn with_lock_is_exclusive() {
        let m = Mutex::new(0u32);
        with_lock(&m, |v| *v += 1).await;
        assert_eq!(with_lock(&m, |v| *v).await, 1);
    }
}
