//! # Fetch trait: the host-owned transport callback.
//!
//! This is the only way the runtime performs actual work. The host owns the
//! transport (HTTP client, Git sync, whatever) and reports each attempt as
//! `Ok(())` or a classified [`FetchError`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FetchError;

/// Why a refresh was triggered; passed through to the host callback and
/// visible in status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshReason {
    /// The per-source interval timer fired.
    Scheduled,
    /// Explicit host request for one source.
    Manual,
    /// Staggered catch-up after network recovery or system wake.
    CatchUp,
    /// The periodic overdue sweep picked the source up.
    Sweep,
    /// "Refresh all sources" batch request.
    Batch,
}

impl RefreshReason {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RefreshReason::Scheduled => "scheduled",
            RefreshReason::Manual => "manual",
            RefreshReason::CatchUp => "catch_up",
            RefreshReason::Sweep => "sweep",
            RefreshReason::Batch => "batch",
        }
    }
}

/// # The host's fetch callback.
///
/// Implementations should classify transport failures as
/// [`FetchError::Network`] (excluded from failure budgets) and application
/// failures as [`FetchError::Remote`]; [`FetchError::from_message`] does a
/// reasonable job when classification is not available.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use refetch::{Fetch, FetchError, RefreshReason};
///
/// struct HttpFetcher;
///
/// #[async_trait]
/// impl Fetch for HttpFetcher {
///     async fn fetch(&self, source_id: &str, reason: RefreshReason) -> Result<(), FetchError> {
///         let _ = (source_id, reason);
///         // perform the request...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    /// Performs one fetch for `source_id`.
    ///
    /// The runtime races this future against the configured timeout; a slow
    /// implementation is treated as failed once the timeout passes.
    async fn fetch(&self, source_id: &str, reason: RefreshReason) -> Result<(), FetchError>;
}

/// Shared handle to a fetch implementation.
pub type FetchRef = Arc<dyn Fetch>;
