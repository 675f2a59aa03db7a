//! Update Scheduling
//!
//! This module decides *when* batched watchers re-run. Dependencies decide
//! *which* watchers are affected; the scheduler collects those watchers,
//! deduplicates them, and runs them in creation order on the next deferred
//! turn of the host.
//!
//! # Design Decisions
//!
//! 1. One queue per thread. Every reactive structure is single-threaded, so
//!    the queue lives in thread-local state and needs no locking.
//!
//! 2. Deferral is delegated to a [`Host`]. The engine never spawns or
//!    blocks; it asks the host to call back once the current synchronous
//!    work has drained.
//!
//! 3. The queue holds strong handles. A watcher that was notified stays
//!    alive until its turn in the flush even if its owner dropped it.

mod host;
mod queue;

pub use host::{Host, MicrotaskHost, Task};
pub use queue::{enqueue, flush, is_flush_scheduled, is_flushing, pending_len, queue_activated, FlushReport};
