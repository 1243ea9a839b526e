//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the scheduler, coordinator,
//! circuit breakers, clock monitor and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Scheduler`, `RefreshCoordinator`, `ClockMonitor`,
//!   per-source breakers (via their owners), `SubscriberSet` workers.
//! - **Consumers**: the manager's subscriber listener (fans out to
//!   `SubscriberSet`) and any host that calls `RefreshManager::subscribe`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
