//! Event subscribers for the refetch runtime.
//!
//! ## Contents
//! - [`Subscribe`] contract for plugging custom event handlers into the runtime
//! - [`SubscriberSet`] non-blocking fan-out with per-subscriber bounded queues
//! - `LogWriter` simple tracing-backed subscriber (feature `logging`)
//!
//! ## Architecture
//! ```text
//! Scheduler/Coordinator/Monitor ── publish(Event) ──► Bus
//!                                                      │
//!                                       manager listener│
//!                                                      ▼
//!                                            SubscriberSet::emit(&Event)
//!                                       ┌─────────┬─────────┐
//!                                       ▼         ▼         ▼
//!                                   [queue S1] [queue S2] [queue SN]
//!                                       │         │         │
//!                                   worker S1 worker S2 worker SN
//!                                       ▼         ▼         ▼
//!                                  on_event() on_event() on_event()
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
