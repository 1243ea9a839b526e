//! # refetch
//!
//! **refetch** is a per-source refresh scheduling runtime for Rust.
//!
//! It keeps data pulled from remote sources fresh on a per-source interval
//! while staying correct under unreliable networks, system sleep/wake, clock
//! jumps, and cascading downstream failures. The host owns the transport;
//! the runtime drives a single injected fetch callback.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Descriptor  │   │  Descriptor  │   │  Descriptor  │
//!     │ (source #1)  │   │ (source #2)  │   │ (source #3)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  RefreshManager (facade; owns wiring, no scheduling logic)        │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - ClockMonitor (jump / wake / timezone / DST detection)          │
//! └──────┬────────────────────────────────────────────────────┬───────┘
//!        ▼                                                    │
//! ┌──────────────────────────┐      ┌─────────────────────────┴─────┐
//! │  Scheduler               │      │  RefreshCoordinator           │
//! │  - ScheduleStore         │──────►  - active set (1 per source)  │
//! │  - per-source timers     │      │  - bounded per-source queues  │
//! │  - catch-up + sweep      │      │  - global semaphore           │
//! │  - per-source breakers   │      │  - timeout race + metrics     │
//! └──────────────────────────┘      └───────────────┬───────────────┘
//!                                                   ▼
//!                                         host fetch callback
//! ```
//!
//! ### Refresh lifecycle
//! ```text
//! timer fires / manual / catch-up / sweep
//!   ├─► exhausted failure budget? → source removed (fatal)
//!   ├─► already refreshing?       → no-op
//!   ├─► breaker window closed?    → re-arm at the window end
//!   └─► coordinator.execute()
//!         ├─ Ok   → breaker success, counters reset, re-arm at interval
//!         ├─ Err(network) → no accounting, re-arm (offline path recovers)
//!         └─ Err(remote/timeout) → breaker + budget accounting, re-arm
//!                                   at the backoff window
//! ```
//!
//! ## Example
//! ```rust
//! use refetch::{
//!     FetchFn, IntervalSpec, RefreshConfig, RefreshManager, RefreshOptions, SourceDescriptor,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetch = FetchFn::arc(|source_id: String, _reason| async move {
//!         // perform the actual fetch for `source_id` here
//!         let _ = source_id;
//!         Ok(())
//!     });
//!
//!     let manager = RefreshManager::builder(RefreshConfig::default()).build(fetch);
//!
//!     manager
//!         .schedule_source(SourceDescriptor {
//!             source_id: "feed-a".into(),
//!             source_type: "rss".into(),
//!             refresh: RefreshOptions::every(IntervalSpec::Text("15 minutes".into())),
//!         })
//!         .await?;
//!
//!     // ... hand the manager to the host application ...
//!
//!     manager.destroy().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                       |
//! |-------------------|-------------------------------------------------------------------|------------------------------------------|
//! | **Scheduling**    | Per-source intervals, wall-clock alignment, overdue handling.     | [`Scheduler`], [`SourceDescriptor`]      |
//! | **Failure isolation** | Circuit breaking with adaptive, jittered backoff.             | [`CircuitBreaker`], [`BreakerConfig`]    |
//! | **Coordination**  | Per-source serialization, bounded queues, global concurrency cap. | [`RefreshCoordinator`], [`RefreshOutcome`] |
//! | **Clock**         | Jump/wake/timezone detection, pure alignment arithmetic.          | [`ClockMonitor`], [`next_aligned_time`]  |
//! | **Observability** | Broadcast events with subscriber fan-out.                         | [`Event`], [`Subscribe`]                 |
//! | **Errors**        | Typed errors with network/remote classification.                  | [`FetchError`], [`ScheduleError`]        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.

mod breaker;
mod clock;
mod config;
mod coordinator;
mod error;
mod events;
mod fetch;
mod manager;
mod scheduler;
mod shutdown;
mod subscribers;
mod sync;

// ---- Public re-exports ----

pub use breaker::{BackoffRecord, BreakerConfig, BreakerState, BreakerStatus, CircuitBreaker, CircuitOpen};
pub use clock::{
    next_aligned_time, Alignment, AnomalyKind, ClockAnomaly, ClockMonitor, ClockService,
    ClockWatch, MonitorConfig, WatchGuard,
};
pub use config::RefreshConfig;
pub use coordinator::{
    BatchOptions, ExecuteOptions, RefreshCoordinator, RefreshMetrics, RefreshOp, RefreshOutcome,
};
pub use error::{FetchError, RuntimeError, ScheduleError};
pub use events::{Bus, Event, EventKind};
pub use fetch::{Fetch, FetchFn, FetchRef, RefreshReason};
pub use manager::{RefreshManager, RefreshManagerBuilder, RefreshStatistics, RefreshStatus};
pub use scheduler::{
    IntervalSpec, NetworkQuality, NetworkState, RefreshOptions, Schedule, ScheduleStore, Scheduler,
    SourceDescriptor,
};
pub use shutdown::wait_for_shutdown_signal;
pub use subscribers::{Subscribe, SubscriberSet};
pub use sync::{with_lock, with_permit, ActiveSet, GuardedMap};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
