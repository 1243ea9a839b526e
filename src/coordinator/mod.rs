//! Refresh execution gate: per-source serialization, global concurrency cap,
//! bounded queues, timeout racing, and metrics.
//!
//! ## Contents
//! - [`RefreshCoordinator`] the single path every refresh execution goes through
//! - [`ExecuteOptions`], [`BatchOptions`] per-call knobs
//! - [`RefreshOutcome`] what happened to one request
//! - [`RefreshMetrics`] aggregated counters
//!
//! ## Rules
//! - At most one refresh in flight per source; excess requests skip or queue.
//! - Completion always releases the slot and drains exactly one queued
//!   request for that source (FIFO).
//! - The global semaphore bounds total parallelism independently of
//!   per-source state.

mod coordinator;
mod metrics;
mod queue;

pub use coordinator::{BatchOptions, ExecuteOptions, RefreshCoordinator, RefreshOutcome};
pub use metrics::RefreshMetrics;
pub use queue::RefreshOp;
