//! Per-source schedule ownership: next-fire computation, timer management,
//! network transitions, catch-up, and the overdue sweep.
//!
//! ## Contents
//! - [`Scheduler`] owns the authoritative next-fire time per source
//! - [`ScheduleStore`] injected store for schedules and per-source breakers
//! - [`Schedule`], [`SourceDescriptor`], [`RefreshOptions`], [`IntervalSpec`]
//! - [`NetworkState`], [`NetworkQuality`] host-pushed network input

mod network;
mod schedule;
mod scheduler;
mod store;

pub use network::{NetworkQuality, NetworkState};
pub use schedule::{IntervalSpec, RefreshOptions, Schedule, SourceDescriptor};
pub use scheduler::Scheduler;
pub use store::ScheduleStore;
