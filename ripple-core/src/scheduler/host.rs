//! Host collaborators.
//!
//! The engine needs three things from its environment: a way to run a
//! callback once the current synchronous work has drained, somewhere to send
//! errors raised by user computations, and somewhere to send diagnostics.
//! [`Host`] bundles them.
//!
//! The default [`MicrotaskHost`] keeps deferred tasks in a thread-local
//! queue that the embedder drains with [`Runtime::tick`], and routes
//! reports to `tracing`.
//!
//! [`Runtime::tick`]: crate::reactive::Runtime::tick

use std::cell::RefCell;
use std::collections::VecDeque;

use tracing::{error, warn};

use crate::error::ReactiveError;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// The environment the engine runs in.
pub trait Host {
    /// Run `task` once, after the current synchronous work has drained.
    fn schedule_deferred(&self, task: Task);

    /// Receive an error raised inside a user getter or callback.
    fn report_error(&self, error: &ReactiveError, context: &str) {
        error!(%context, %error, "error in user computation");
    }

    /// Receive a non-fatal invariant warning.
    fn report_diagnostic(&self, message: &str, context: &str) {
        warn!(%context, "{message}");
    }
}

thread_local! {
    static MICROTASKS: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
}

/// Default host backed by a thread-local microtask queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct MicrotaskHost;

impl MicrotaskHost {
    /// Number of tasks waiting to run.
    pub fn pending() -> usize {
        MICROTASKS.with(|tasks| tasks.borrow().len())
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves. Returns how many ran.
    pub fn drain() -> usize {
        let mut ran = 0;
        // Pop one at a time so no borrow is held while a task runs.
        while let Some(task) = MICROTASKS.with(|tasks| tasks.borrow_mut().pop_front()) {
            task();
            ran += 1;
        }
        ran
    }
}

impl Host for MicrotaskHost {
    fn schedule_deferred(&self, task: Task) {
        MICROTASKS.with(|tasks| tasks.borrow_mut().push_back(task));
    }
}
