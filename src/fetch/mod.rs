//! # Fetch abstractions.
//!
//! The runtime never performs network I/O itself; the host injects a single
//! callback capable of "perform one fetch for source X and report
//! success/failure".
//!
//! - [`Fetch`] - trait for implementing the host's fetch callback
//! - [`FetchFn`] - function-backed implementation
//! - [`FetchRef`] - shared handle (`Arc<dyn Fetch>`)
//! - [`RefreshReason`] - why a refresh was triggered

mod fetch;
mod fetch_fn;

pub use fetch::{Fetch, FetchRef, RefreshReason};
pub use fetch_fn::FetchFn;
