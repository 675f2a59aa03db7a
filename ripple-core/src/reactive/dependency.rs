//! Dependencies
//!
//! A [`Dependency`] is a notification hub. It holds no data itself, only the
//! ordered set of watchers currently subscribed to it. Every reactive slot
//! owns one, and every observed container owns one more for its shape.
//!
//! Subscriptions are weak: a dependency never keeps a watcher alive. Entries
//! whose watcher has been dropped are pruned the next time the dependency
//! notifies.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::watcher::{Watcher, WatcherId, WatcherInner};
use crate::error::Result;

/// Unique identifier for a dependency.
///
/// Ids increase monotonically and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct DepInner {
    id: DepId,
    subscribers: RefCell<IndexMap<WatcherId, Weak<WatcherInner>>>,
}

/// A notification hub for one reactive slot or one container shape.
///
/// Cloning a `Dependency` creates another handle to the same hub.
#[derive(Clone)]
pub struct Dependency {
    inner: Rc<DepInner>,
}

impl Dependency {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId::next(),
                subscribers: RefCell::new(IndexMap::new()),
            }),
        }
    }

    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Subscribe a watcher. No-op if it is already subscribed.
    pub fn subscribe(&self, watcher: &Watcher) {
        self.inner
            .subscribers
            .borrow_mut()
            .entry(watcher.id())
            .or_insert_with(|| watcher.downgrade());
    }

    /// Remove a watcher. No-op if it is not subscribed.
    pub fn unsubscribe(&self, watcher_id: WatcherId) {
        self.inner
            .subscribers
            .borrow_mut()
            .shift_remove(&watcher_id);
    }

    /// Attribute a read of this dependency to the watcher currently
    /// evaluating, if there is one.
    pub fn track(&self) {
        if let Some(watcher) = ReactiveContext::current() {
            watcher.add_dependency(self);
        }
    }

    /// Notify every subscriber that the data behind this dependency changed.
    ///
    /// Iterates over a snapshot, so subscribers may subscribe or unsubscribe
    /// re-entrantly. Every subscriber is updated even if an earlier one
    /// fails; the first error is returned.
    pub fn notify(&self) -> Result<()> {
        let snapshot: SmallVec<[Watcher; 8]> = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            subscribers.retain(|_, weak| weak.strong_count() > 0);
            subscribers
                .values()
                .filter_map(Watcher::upgrade)
                .collect()
        };

        let mut first_error = None;
        for watcher in snapshot {
            if let Err(err) = watcher.update() {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Whether the given watcher is subscribed.
    pub fn has_subscriber(&self, watcher_id: WatcherId) -> bool {
        self.inner.subscribers.borrow().contains_key(&watcher_id)
    }
}

impl Default for Dependency {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("id", &self.inner.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::WatcherOptions;
    use crate::Value;
    use std::cell::Cell;

    fn sync_watcher(runs: Rc<Cell<u32>>) -> Watcher {
        Watcher::new(
            move || {
                runs.set(runs.get() + 1);
                Ok(Value::Null)
            },
            None,
            WatcherOptions {
                sync: true,
                ..WatcherOptions::default()
            },
        )
        .expect("getter never fails")
    }

    #[test]
    fn dependency_ids_are_unique() {
        let a = Dependency::new();
        let b = Dependency::new();
        assert_ne!(a.id(), b.id());
        assert!(a.id() < b.id());
    }

    #[test]
    fn subscribe_is_idempotent() {
        let dep = Dependency::new();
        let watcher = sync_watcher(Rc::new(Cell::new(0)));

        dep.subscribe(&watcher);
        dep.subscribe(&watcher);
        assert_eq!(dep.subscriber_count(), 1);

        dep.unsubscribe(watcher.id());
        dep.unsubscribe(watcher.id());
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn notify_updates_each_subscriber_once() {
        let dep = Dependency::new();
        let runs = Rc::new(Cell::new(0));
        let watcher = sync_watcher(runs.clone());
        assert_eq!(runs.get(), 1);

        dep.subscribe(&watcher);
        dep.notify().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn dropped_watchers_are_pruned() {
        let dep = Dependency::new();
        let watcher = sync_watcher(Rc::new(Cell::new(0)));
        dep.subscribe(&watcher);
        drop(watcher);

        assert_eq!(dep.subscriber_count(), 0);
        dep.notify().unwrap();
        assert!(dep.inner.subscribers.borrow().is_empty());
    }

    #[test]
    fn track_without_context_is_noop() {
        let dep = Dependency::new();
        dep.track();
        assert_eq!(dep.subscriber_count(), 0);
    }
}
