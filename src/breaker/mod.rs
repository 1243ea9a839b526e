//! Per-source failure isolation: circuit breaking with adaptive backoff.
//!
//! Stops hammering a consistently failing source and resumes cautiously once
//! it might be healthy again.
//!
//! ## Contents
//! - [`CircuitBreaker`] the state machine (one instance per source)
//! - [`BreakerConfig`] thresholds and backoff shape
//! - [`BreakerState`], [`BreakerStatus`], [`BackoffRecord`] status exposure
//! - [`CircuitOpen`] rejection error for gated execution
//!
//! ## State machine
//! ```text
//! Closed ──(failures ≥ threshold)──► Open
//! Open ──(first can_attempt() after next_attempt_at)──► HalfOpen
//! HalfOpen ──(first success)──► Closed
//! HalfOpen ──(any failure)──► Open   (cumulative backoff level preserved)
//! ```

mod breaker;
mod config;
mod state;

pub use breaker::{CircuitBreaker, CircuitOpen};
pub use config::BreakerConfig;
pub use state::{BackoffRecord, BreakerState, BreakerStatus};
