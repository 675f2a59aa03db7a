//! Memo Implementation
//!
//! A Memo is a cached derived value backed by a lazy watcher.
//!
//! # How Memos Work
//!
//! 1. A new memo is dirty and has not run its computation.
//!
//! 2. On access, a dirty memo runs its computation, caches the result and
//!    becomes clean. A clean memo returns the cached value.
//!
//! 3. When a dependency changes and nobody is subscribed to the memo, it is
//!    only marked dirty. Nothing recomputes until the next access.
//!
//! 4. When watchers have read the memo, they are subscribed to its own
//!    dependency. A dependency change then recomputes the memo right away and
//!    notifies those watchers only if the result changed.
//!
//! # Why This Matters
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually read will recompute
//! - Memos that are never read stay dirty (no wasted work)

use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::runtime::Runtime;
use super::watcher::{Getter, Watcher, WatcherOptions, WatcherOwner};
use crate::error::Result;
use crate::value::Value;

/// Write handler for a memo that supports assignment.
pub type Setter = Rc<dyn Fn(Value) -> Result<()>>;

/// A cached derived value that recomputes only when read after a change.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Memo, Signal};
/// use ripple_core::Value;
///
/// let a = Signal::new(5);
/// let source = a.clone();
/// let double = Memo::new(move || {
///     Ok(Value::from(source.get().as_number().unwrap_or(0.0) * 2.0))
/// });
///
/// assert_eq!(double.get().unwrap(), Value::from(10));
/// a.set(6).unwrap();
/// assert_eq!(double.get().unwrap(), Value::from(12));
/// ```
#[derive(Clone)]
pub struct Memo {
    watcher: Watcher,
    setter: Option<Setter>,
}

impl Memo {
    /// Create a memo from a computation.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<Value> + 'static,
    {
        Self::with_options(Rc::new(compute), None, None, None)
    }

    /// Create a memo whose assignments are forwarded to `setter`.
    pub fn with_setter<F, S>(compute: F, setter: S) -> Self
    where
        F: Fn() -> Result<Value> + 'static,
        S: Fn(Value) -> Result<()> + 'static,
    {
        Self::with_options(Rc::new(compute), Some(Rc::new(setter)), None, None)
    }

    pub(crate) fn with_options(
        compute: Getter,
        setter: Option<Setter>,
        label: Option<String>,
        owner: Option<Weak<dyn WatcherOwner>>,
    ) -> Self {
        let watcher = Watcher::build(
            compute,
            None,
            WatcherOptions {
                lazy: true,
                label,
                owner,
                ..WatcherOptions::default()
            },
        );
        Self { watcher, setter }
    }

    /// Get the value, recomputing first if a dependency changed since the
    /// last read. Subscribes the current watcher, if any, to this memo.
    pub fn get(&self) -> Result<Value> {
        let value = self.watcher.evaluate_lazy()?;
        self.watcher.register_as_dependent();
        Ok(value)
    }

    /// Assign through the setter.
    ///
    /// Without a setter this only emits a diagnostic.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        match &self.setter {
            Some(setter) => setter(value.into()),
            None => {
                let label = self.watcher.label();
                Runtime::diagnostic(
                    &format!("Memo \"{label}\" was assigned to but it has no setter"),
                    label,
                );
                Ok(())
            }
        }
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Number of watchers subscribed to this memo.
    pub fn subscriber_count(&self) -> usize {
        self.watcher
            .own_dependency()
            .map_or(0, |dep| dep.subscriber_count())
    }

    /// Stop tracking dependencies. Reads keep returning the last value.
    pub fn dispose(&self) {
        self.watcher.teardown();
    }
}

impl Debug for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("label", &self.watcher.label())
            .field("dirty", &self.is_dirty())
            .field("value", &self.watcher.value())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::cell::{Cell, RefCell};

    fn doubled(source: &Signal, evaluations: &Rc<Cell<u32>>) -> Memo {
        let source = source.clone();
        let evaluations = evaluations.clone();
        Memo::new(move || {
            evaluations.set(evaluations.get() + 1);
            Ok(Value::from(source.get().as_number().unwrap_or(0.0) * 2.0))
        })
    }

    #[test]
    fn memo_recomputes_only_on_demand() {
        let a = Signal::new(5);
        let evaluations = Rc::new(Cell::new(0));
        let double = doubled(&a, &evaluations);
        assert_eq!(evaluations.get(), 0);

        assert_eq!(double.get().unwrap(), Value::from(10));
        assert_eq!(evaluations.get(), 1);

        a.set(6).unwrap();
        assert!(double.is_dirty());
        assert_eq!(evaluations.get(), 1);

        assert_eq!(double.get().unwrap(), Value::from(12));
        assert_eq!(evaluations.get(), 2);
    }

    #[test]
    fn memo_caches_between_reads() {
        let a = Signal::new(1);
        let evaluations = Rc::new(Cell::new(0));
        let double = doubled(&a, &evaluations);

        double.get().unwrap();
        double.get().unwrap();
        double.get().unwrap();
        assert_eq!(evaluations.get(), 1);
    }

    #[test]
    fn memo_chain_propagates_to_subscribers() {
        let a = Signal::new(1);
        let evaluations = Rc::new(Cell::new(0));
        let double = doubled(&a, &evaluations);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let reader = double.clone();
        let _watcher = Watcher::new(
            move || reader.get(),
            Some(Rc::new(move |new: &Value, _: &Value| {
                sink.borrow_mut().push(new.clone());
                Ok(())
            })),
            WatcherOptions {
                sync: true,
                ..WatcherOptions::default()
            },
        )
        .unwrap();
        assert_eq!(double.subscriber_count(), 1);

        a.set(4).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from(8)]);
    }

    #[test]
    fn unchanged_memo_result_does_not_notify() {
        let a = Signal::new(1);
        let source = a.clone();
        let positive = Memo::new(move || Ok(Value::from(source.get().as_number().unwrap_or(0.0) > 0.0)));

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let reader = positive.clone();
        let _watcher = Watcher::new(
            move || {
                counter.set(counter.get() + 1);
                reader.get()
            },
            None,
            WatcherOptions {
                sync: true,
                ..WatcherOptions::default()
            },
        )
        .unwrap();

        a.set(2).unwrap();
        a.set(3).unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn setter_receives_assignments() {
        let a = Signal::new(1);
        let (source, target) = (a.clone(), a.clone());
        let memo = Memo::with_setter(move || Ok(source.get()), move |value| target.set(value));

        memo.set(7).unwrap();
        assert_eq!(memo.get().unwrap(), Value::from(7));
    }

    #[test]
    fn assignment_without_setter_is_ignored() {
        let memo = Memo::new(|| Ok(Value::from(1)));
        memo.set(2).unwrap();
        assert_eq!(memo.get().unwrap(), Value::from(1));
    }

    #[test]
    fn disposed_memo_stops_tracking() {
        let a = Signal::new(1);
        let evaluations = Rc::new(Cell::new(0));
        let double = doubled(&a, &evaluations);
        double.get().unwrap();
        assert_eq!(a.subscriber_count(), 1);

        double.dispose();
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(double.watcher().value(), Value::from(2));
    }
}
