//! Concurrency primitives the rest of the runtime builds on.
//!
//! The scheduling engine assumes atomicity for "is this source active",
//! "increment the retry count", and "pop the next queued item". These
//! wrappers make the check-then-act shape explicit instead of scattering
//! lock handling across the codebase.
//!
//! ## Contents
//! - [`GuardedMap`] keyed map with serialized operations and atomic `update`
//! - [`ActiveSet`] membership set with atomic `try_insert`
//! - [`with_permit`] / [`with_lock`] scoped semaphore/mutex helpers

mod map;
mod permit;
mod set;

pub use map::GuardedMap;
pub use permit::{with_lock, with_permit};
pub use set::ActiveSet;
