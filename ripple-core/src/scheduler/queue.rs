//! Batched Update Queue
//!
//! Batched watchers are not run when notified. They are queued here and run
//! together in the next flush.
//!
//! # Algorithm
//!
//! 1. `enqueue` ignores a watcher that is already pending, so any number of
//!    notifications before the flush collapse into one run.
//!
//! 2. The first enqueue of a cycle asks the host to call `flush` once the
//!    current synchronous work has drained.
//!
//! 3. `flush` sorts the queue by watcher id and walks it with a live cursor.
//!    Ids follow creation order, so owners run before the things they
//!    contain and explicit watches run before the render watcher of the
//!    owner that created them.
//!
//! 4. A watcher enqueued while the flush is running is inserted in id order
//!    behind the cursor, so it still runs in the same flush.
//!
//! 5. Once the loop is done the queue is reset, then the activated tasks run,
//!    then each flushed render watcher's owner gets `after_flush`, visiting
//!    the flushed watchers in reverse.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use super::host::Task;
use crate::error::{ReactiveError, Result};
use crate::reactive::{Runtime, Watcher, WatcherId};

thread_local! {
    static QUEUE: RefCell<QueueState> = RefCell::new(QueueState::default());
}

#[derive(Default)]
struct QueueState {
    pending: Vec<Watcher>,
    membership: HashSet<WatcherId>,
    activated: Vec<Task>,
    /// Re-queue counts per watcher within the current flush.
    circular: HashMap<WatcherId, u32>,
    flushing: bool,
    flush_scheduled: bool,
    cursor: usize,
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of watcher runs performed.
    pub ran: usize,
    /// The circular-update guard stopped the loop early.
    pub aborted: bool,
}

/// Queue a batched watcher for the next flush.
///
/// No-op if the watcher is already pending. With synchronous flushing
/// configured, the queue is flushed before this returns.
pub fn enqueue(watcher: Watcher) -> Result<()> {
    let id = watcher.id();
    let queued = QUEUE.with(|queue| {
        let mut state = queue.borrow_mut();
        if !state.membership.insert(id) {
            return false;
        }
        if state.flushing {
            let mut index = state.pending.len();
            while index > state.cursor + 1 && state.pending[index - 1].id() > id {
                index -= 1;
            }
            state.pending.insert(index, watcher);
        } else {
            state.pending.push(watcher);
        }
        true
    });

    if queued {
        trace!(watcher = id.raw(), "enqueued watcher");
        schedule_flush()?;
    }
    Ok(())
}

/// Queue a task to run after the next flush, before owners receive
/// `after_flush`.
pub fn queue_activated(task: Task) -> Result<()> {
    QUEUE.with(|queue| queue.borrow_mut().activated.push(task));
    schedule_flush()
}

fn schedule_flush() -> Result<()> {
    let first = QUEUE.with(|queue| {
        let mut state = queue.borrow_mut();
        !std::mem::replace(&mut state.flush_scheduled, true)
    });
    if !first {
        return Ok(());
    }

    if Runtime::config().async_flush {
        Runtime::host().schedule_deferred(Box::new(|| {
            if let Err(err) = flush() {
                Runtime::report_error(&err, "scheduler flush");
            }
        }));
        Ok(())
    } else {
        flush().map(drop)
    }
}

/// Run every pending watcher.
///
/// A fatal error from a non-user watcher stops the loop and is returned
/// without running post-flush hooks. Watchers that had not run yet stay
/// queued and a new flush is scheduled for them. Calling `flush` while a
/// flush is in progress does nothing.
pub fn flush() -> Result<FlushReport> {
    let started = QUEUE.with(|queue| {
        let mut state = queue.borrow_mut();
        if state.flushing {
            return false;
        }
        state.flushing = true;
        state.flush_scheduled = true;
        state.cursor = 0;
        state.pending.sort_by_key(Watcher::id);
        true
    });
    if !started {
        return Ok(FlushReport::default());
    }

    let config = Runtime::config();
    let mut report = FlushReport::default();
    let mut failure = None;

    while let Some(watcher) = QUEUE.with(|queue| {
        let state = queue.borrow();
        state.pending.get(state.cursor).cloned()
    }) {
        watcher.call_before();
        let id = watcher.id();
        QUEUE.with(|queue| queue.borrow_mut().membership.remove(&id));

        report.ran += 1;
        if let Err(err) = watcher.run() {
            failure = Some(err);
            break;
        }

        if config.diagnostics && requeued_too_often(id, config.max_update_count) {
            let message = format!(
                "You may have an infinite update loop in watcher \"{}\"",
                watcher.label()
            );
            Runtime::diagnostic(&message, watcher.label());
            report.aborted = true;
            break;
        }

        QUEUE.with(|queue| queue.borrow_mut().cursor += 1);
    }

    if let Some(err) = failure {
        return Err(requeue_after_failure(err));
    }

    let state = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
    debug!(ran = report.ran, aborted = report.aborted, "flushed update queue");

    for task in state.activated {
        task();
    }
    for watcher in state.pending.iter().rev() {
        if watcher.is_render() && watcher.is_active() {
            if let Some(owner) = watcher.owner() {
                owner.after_flush(watcher);
            }
        }
    }

    Ok(report)
}

/// Reset the queue after a fatal error, keeping the watchers behind the
/// cursor and the activated tasks for a fresh flush.
fn requeue_after_failure(err: ReactiveError) -> ReactiveError {
    let remaining = QUEUE.with(|queue| {
        let mut state = queue.borrow_mut();
        let old = std::mem::take(&mut *state);
        let tail = old.cursor.saturating_add(1).min(old.pending.len());
        state.pending = old.pending[tail..].to_vec();
        state.membership = state.pending.iter().map(Watcher::id).collect();
        state.activated = old.activated;
        state.pending.len() + state.activated.len()
    });
    debug!(remaining, error = %err, "flush stopped by a failing watcher");

    if remaining > 0 {
        if let Err(next) = schedule_flush() {
            Runtime::report_error(&next, "scheduler flush");
        }
    }
    err
}

/// Count a re-queue of `id` during its own run. True once it exceeds `limit`.
fn requeued_too_often(id: WatcherId, limit: u32) -> bool {
    QUEUE.with(|queue| {
        let mut state = queue.borrow_mut();
        if !state.membership.contains(&id) {
            return false;
        }
        let count = state.circular.entry(id).or_insert(0);
        *count += 1;
        *count > limit
    })
}

/// Number of watchers waiting in the queue.
pub fn pending_len() -> usize {
    QUEUE.with(|queue| {
        let state = queue.borrow();
        state.pending.len().saturating_sub(state.cursor)
    })
}

pub fn is_flushing() -> bool {
    QUEUE.with(|queue| queue.borrow().flushing)
}

/// Whether a flush has been requested and not yet completed.
pub fn is_flush_scheduled() -> bool {
    QUEUE.with(|queue| queue.borrow().flush_scheduled)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Signal, WatcherOptions};
    use crate::value::Value;
    use std::cell::Cell;
    use std::rc::Rc;

    fn batched(signal: &Signal, log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Watcher {
        let source = signal.clone();
        let sink = log.clone();
        Watcher::new(
            move || Ok(source.get()),
            Some(Rc::new(move |_: &Value, _: &Value| {
                sink.borrow_mut().push(name);
                Ok(())
            })),
            WatcherOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn enqueue_deduplicates_until_flush() {
        let signal = Signal::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let _watcher = batched(&signal, &log, "w");

        signal.set(1).unwrap();
        signal.set(2).unwrap();
        signal.set(3).unwrap();
        assert_eq!(pending_len(), 1);
        assert!(is_flush_scheduled());

        let report = flush().unwrap();
        assert_eq!(report, FlushReport { ran: 1, aborted: false });
        assert_eq!(*log.borrow(), vec!["w"]);
        assert_eq!(pending_len(), 0);
        assert!(!is_flush_scheduled());
    }

    #[test]
    fn flush_runs_in_creation_order() {
        let signal = Signal::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = batched(&signal, &log, "first");
        let second = batched(&signal, &log, "second");

        // Enqueue out of order; the flush sorts by id.
        enqueue(second).unwrap();
        enqueue(first).unwrap();
        signal.set(1).unwrap();
        flush().unwrap();

        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn nested_flush_is_a_no_op() {
        let signal = Signal::new(0);
        let nested = Rc::new(Cell::new(None));
        let inner = nested.clone();
        let source = signal.clone();
        let _watcher = Watcher::new(
            move || Ok(source.get()),
            Some(Rc::new(move |_: &Value, _: &Value| {
                inner.set(Some(flush()?));
                Ok(())
            })),
            WatcherOptions::default(),
        )
        .unwrap();

        signal.set(1).unwrap();
        flush().unwrap();
        assert_eq!(nested.get(), Some(FlushReport::default()));
    }

    #[test]
    fn activated_tasks_run_after_the_loop() {
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        queue_activated(Box::new(move || flag.set(true))).unwrap();
        assert!(!hit.get());

        flush().unwrap();
        assert!(hit.get());
    }
}
