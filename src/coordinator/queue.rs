//! Per-source pending-request queue types.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::coordinator::RefreshOutcome;
use crate::error::FetchError;

/// A deferred refresh operation: invoked at most once, producing the fetch
/// future when the coordinator is ready to run it.
pub type RefreshOp = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), FetchError>> + Send>;

/// One queued request waiting for the in-flight refresh of its source.
pub(crate) struct QueuedRequest {
    /// The operation to run when drained.
    pub op: RefreshOp,
    /// Timeout to apply when the request eventually runs.
    pub timeout: Option<Duration>,
    /// Resolution channel back to the caller awaiting this request.
    pub tx: oneshot::Sender<RefreshOutcome>,
}
