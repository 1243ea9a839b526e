//! Clock service: reconciled "now", wall-clock alignment, anomaly detection.
//!
//! The rest of the runtime never reads the system clock directly; it goes
//! through [`ClockService`] so wall time (schedule arithmetic) and monotonic
//! time (elapsed measurement) stay cleanly separated.
//!
//! ## Contents
//! - [`ClockService`] wall + monotonic readings
//! - [`next_aligned_time`] / [`Alignment`] pure boundary arithmetic
//! - [`ClockMonitor`] periodic tick that detects jumps, sleep/wake,
//!   timezone and DST changes, and notifies [`ClockWatch`] subscribers

mod align;
mod monitor;
mod service;

pub use align::{next_aligned_time, Alignment};
pub use monitor::{
    AnomalyKind, ClockAnomaly, ClockMonitor, ClockWatch, MonitorConfig, WatchGuard,
};
pub use service::ClockService;
