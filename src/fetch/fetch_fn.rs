//! # Function-backed fetch callback (`FetchFn`)
//!
//! [`FetchFn`] wraps a closure `F: Fn(String, RefreshReason) -> Fut`,
//! producing a fresh future per fetch. No shared mutable state is required;
//! if the closure needs any, it captures an `Arc<...>` explicitly.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::fetch::{Fetch, FetchRef, RefreshReason};

/// Function-backed fetch implementation.
///
/// ## Example
/// ```rust
/// use refetch::{FetchFn, FetchRef, RefreshReason};
///
/// let f: FetchRef = FetchFn::arc(|source_id: String, _reason: RefreshReason| async move {
///     let _ = source_id;
///     Ok(())
/// });
/// ```
pub struct FetchFn<F> {
    f: F,
}

impl<F> FetchFn<F> {
    /// Wraps the closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps the closure and returns it as a shared handle.
    pub fn arc<Fut>(f: F) -> FetchRef
    where
        F: Fn(String, RefreshReason) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FetchError>> + Send + 'static,
    {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Fetch for FetchFn<F>
where
    F: Fn(String, RefreshReason) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), FetchError>> + Send + 'static,
{
    async fn fetch(&self, source_id: &str, reason: RefreshReason) -> Result<(), FetchError> {
        (self.f)(source_id.to_string(), reason).await
    }
}
