//! Reactive Context
//!
//! The reactive context tracks which watcher is currently evaluating.
//! This enables automatic dependency tracking: when a reactive slot is read,
//! the current watcher is asked to record the slot's dependency.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a context pushes a frame and
//! returns a guard; dropping the guard pops it, so the stack stays balanced
//! even when a getter returns early with an error or panics.
//!
//! A frame may also be empty. [`ReactiveContext::untracked`] pushes an empty
//! frame so reads inside it are attributed to nobody, which nested
//! evaluation relies on (e.g. lifecycle hooks that must not subscribe the
//! surrounding render watcher).

use std::cell::RefCell;

use super::watcher::{Watcher, WatcherId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    watcher_id: Option<WatcherId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given watcher.
    ///
    /// While this context is active, any reactive reads register a
    /// dependency on `watcher`.
    pub fn enter(watcher: Watcher) -> Self {
        let watcher_id = Some(watcher.id());
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Some(watcher)));
        Self { watcher_id }
    }

    /// Enter a frame that suppresses tracking until the guard is dropped.
    pub fn suspend() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(None));
        Self { watcher_id: None }
    }

    /// Run `f` with dependency tracking suppressed.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _ctx = Self::suspend();
        f()
    }

    /// Check whether reads are currently attributed to a watcher.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Get the watcher currently evaluating, if any.
    pub fn current() -> Option<Watcher> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Depth of the context stack, counting suspended frames.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catch mismatched enter/exit pairs.
            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.as_ref().map(Watcher::id),
                    self.watcher_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}
