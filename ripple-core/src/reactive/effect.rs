//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued and re-runs in the
//!    next flush (or immediately, for [`Effect::sync`]).
//!
//! 3. Every run collects dependencies afresh, so reads that stop happening
//!    stop triggering the effect.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Errors
//!
//! Effects are not user watchers. An error returned by the effect function
//! is fatal: it fails construction, or it aborts the flush that ran it and
//! is returned from [`Runtime::flush`](super::Runtime::flush).

use std::cell::Cell;
use std::rc::{Rc, Weak};

use super::watcher::{BeforeHook, Watcher, WatcherId, WatcherOptions, WatcherOwner};
use crate::error::Result;
use crate::value::Value;

/// A side-effecting computation that runs when dependencies change.
///
/// Dropping every handle to an effect detaches it.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Effect, Runtime, Signal};
///
/// let count = Signal::new(0);
/// let source = count.clone();
/// let effect = Effect::new(move || {
///     println!("Count is: {:?}", source.get());
///     Ok(())
/// })
/// .unwrap();
///
/// count.set(5).unwrap();
/// Runtime::flush().unwrap(); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    watcher: Watcher,
    run_count: Rc<Cell<usize>>,
}

impl Effect {
    /// Create a batched effect and run it once.
    pub fn new<F>(run: F) -> Result<Self>
    where
        F: Fn() -> Result<()> + 'static,
    {
        Self::with_options(run, WatcherOptions::default())
    }

    /// Create an effect that re-runs inside the notifying write.
    pub fn sync<F>(run: F) -> Result<Self>
    where
        F: Fn() -> Result<()> + 'static,
    {
        Self::with_options(
            run,
            WatcherOptions {
                sync: true,
                ..WatcherOptions::default()
            },
        )
    }

    /// Create the render effect of an owner.
    pub(crate) fn render<F>(
        run: F,
        label: String,
        before: BeforeHook,
        owner: Weak<dyn WatcherOwner>,
    ) -> Result<Self>
    where
        F: Fn() -> Result<()> + 'static,
    {
        Self::with_options(
            run,
            WatcherOptions {
                render: true,
                before: Some(before),
                label: Some(label),
                owner: Some(owner),
                ..WatcherOptions::default()
            },
        )
    }

    fn with_options<F>(run: F, options: WatcherOptions) -> Result<Self>
    where
        F: Fn() -> Result<()> + 'static,
    {
        let run_count = Rc::new(Cell::new(0));
        let counter = run_count.clone();
        let watcher = Watcher::new(
            move || {
                counter.set(counter.get() + 1);
                run()?;
                Ok(Value::Null)
            },
            None,
            options,
        )?;
        Ok(Self { watcher, run_count })
    }

    pub fn id(&self) -> WatcherId {
        self.watcher.id()
    }

    /// How many times the effect function has run.
    pub fn run_count(&self) -> usize {
        self.run_count.get()
    }

    /// Stop the effect. It will not run again.
    pub fn dispose(&self) {
        self.watcher.teardown();
    }

    pub fn is_disposed(&self) -> bool {
        !self.watcher.is_active()
    }

    pub fn dependency_count(&self) -> usize {
        self.watcher.dependency_count()
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
