//! Reactive Runtime
//!
//! The runtime is the per-thread entry point that ties the engine to its
//! environment: which [`Host`] receives deferred flushes and reports, and
//! which [`Config`] is in force.
//!
//! # How It Works
//!
//! 1. The host and config live in thread-local storage. Every thread starts
//!    with a [`MicrotaskHost`] and `Config::default()`.
//!
//! 2. The scheduler asks the runtime for the host whenever it needs a flush
//!    scheduled, so a host installed with [`Runtime::set_host`] takes effect
//!    for the next flush cycle.
//!
//! 3. Errors from user computations and invariant diagnostics are routed
//!    through the host. Diagnostics are dropped when `Config::diagnostics`
//!    is off.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::context::ReactiveContext;
use super::watcher::Watcher;
use crate::config::Config;
use crate::error::{ReactiveError, Result};
use crate::scheduler::{self, FlushReport, Host, MicrotaskHost, Task};

thread_local! {
    static HOST: RefCell<Rc<dyn Host>> = RefCell::new(Rc::new(MicrotaskHost));
    static CONFIG: Cell<Config> = Cell::new(Config::default());
}

/// Per-thread access to the engine's host and configuration.
pub struct Runtime;

impl Runtime {
    /// Install a host for this thread, returning the previous one.
    pub fn set_host(host: Rc<dyn Host>) -> Rc<dyn Host> {
        HOST.with(|slot| slot.replace(host))
    }

    /// Restore the default [`MicrotaskHost`].
    pub fn reset_host() {
        Self::set_host(Rc::new(MicrotaskHost));
    }

    pub fn host() -> Rc<dyn Host> {
        HOST.with(|slot| slot.borrow().clone())
    }

    /// Replace this thread's configuration.
    pub fn configure(config: Config) {
        CONFIG.with(|slot| slot.set(config));
    }

    pub fn config() -> Config {
        CONFIG.with(Cell::get)
    }

    /// Drain the default host's deferred tasks, running any scheduled flush.
    ///
    /// Returns the number of tasks run. Has no effect on tasks handed to a
    /// custom host.
    pub fn tick() -> usize {
        MicrotaskHost::drain()
    }

    /// Flush the update queue now instead of waiting for the host.
    pub fn flush() -> Result<FlushReport> {
        scheduler::flush()
    }

    /// Run `task` on the host's next deferred turn.
    pub fn next_tick(task: impl FnOnce() + 'static) {
        let task: Task = Box::new(task);
        Self::host().schedule_deferred(task);
    }

    /// The watcher currently evaluating, if any.
    pub fn current_watcher() -> Option<Watcher> {
        ReactiveContext::current()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Forward an error raised by a user computation to the host.
    pub fn report_error(error: &ReactiveError, context: &str) {
        Self::host().report_error(error, context);
    }

    /// Forward an invariant warning to the host if diagnostics are enabled.
    pub fn diagnostic(message: &str, context: &str) {
        if Self::config().diagnostics {
            Self::host().report_diagnostic(message, context);
        }
    }
}
