//! Observers
//!
//! An [`Observer`] is attached to a container the first time it becomes
//! reactive. It owns the container's shape dependency, which fires on
//! structural change (keys added or removed, list insertions, removals and
//! reorders), and counts how many owners use the container as their root.
//!
//! Attaching is idempotent: observing an already observed container returns
//! its existing observer. Observing a record converts each of its fields into
//! a reactive slot; observing a list observes each element. Frozen
//! containers, containers marked raw, and anything observed while
//! observation is disabled are left alone.
//!
//! # Slots
//!
//! A slot is one stored value plus, when reactive, the dependency guarding
//! it. Reads attribute the slot's dependency to the current watcher, along
//! with the stored container's shape dependency, and for lists every
//! observed element's shape dependency (element reads cannot be intercepted
//! individually, so the list read stands in for them). Writes compare with
//! [`Value::same_value`] and notify only on change.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::dependency::Dependency;
use super::list::List;
use super::record::Record;
use super::runtime::Runtime;
use crate::error::{ReactiveError, Result};
use crate::value::Value;

thread_local! {
    static OBSERVING: Cell<bool> = const { Cell::new(true) };
}

/// Per-container flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Flags {
    pub(crate) frozen: bool,
    pub(crate) raw: bool,
}

struct ObserverInner {
    dep: Dependency,
    root_count: Cell<usize>,
}

/// The attachment that routes a container's changes through dependencies.
#[derive(Clone)]
pub struct Observer {
    inner: Rc<ObserverInner>,
}

impl Observer {
    fn new() -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                dep: Dependency::new(),
                root_count: Cell::new(0),
            }),
        }
    }

    /// The container's shape dependency.
    pub fn dependency(&self) -> &Dependency {
        &self.inner.dep
    }

    /// How many owners use this container as their root.
    pub fn root_count(&self) -> usize {
        self.inner.root_count.get()
    }

    pub(crate) fn release_root(&self) {
        let count = self.inner.root_count.get();
        self.inner.root_count.set(count.saturating_sub(1));
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.inner.dep.id())
            .field("root_count", &self.root_count())
            .finish()
    }
}

/// Attach an observer to `value` if it is an observable container.
///
/// Returns the existing or new observer, or `None` for scalars, frozen or
/// raw containers, and unobserved containers while observation is disabled.
/// `as_root` registers one more root owner.
pub fn observe(value: &Value, as_root: bool) -> Option<Observer> {
    let observer = match value {
        Value::Record(record) => match record.observer() {
            Some(observer) => observer,
            None if can_observe(value) => {
                let observer = Observer::new();
                record.attach_observer(observer.clone());
                record.make_slots_reactive();
                observer
            }
            None => return None,
        },
        Value::List(list) => match list.observer() {
            Some(observer) => observer,
            None if can_observe(value) => {
                let observer = Observer::new();
                list.attach_observer(observer.clone());
                for item in list.to_vec_untracked() {
                    observe(&item, false);
                }
                observer
            }
            None => return None,
        },
        _ => return None,
    };

    if as_root {
        observer.inner.root_count.set(observer.root_count() + 1);
    }
    Some(observer)
}

fn can_observe(value: &Value) -> bool {
    is_observing() && !value.is_frozen() && !value.is_raw()
}

/// Options for [`define_reactive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactiveOptions {
    /// Do not observe the stored value.
    pub shallow: bool,
    /// Writes still apply but emit a read-only diagnostic.
    pub readonly: bool,
}

/// Define `key` on `record` as a reactive slot holding `value`.
///
/// Replaces any existing slot for `key` in place, keeping the key's position.
/// Keys starting with `$` or `_` on a root record are reported as reserved.
pub fn define_reactive(
    record: &Record,
    key: &str,
    value: impl Into<Value>,
    options: ReactiveOptions,
) -> Result<()> {
    if record.is_frozen() {
        return Err(ReactiveError::Frozen("record"));
    }
    let is_root = record.observer().is_some_and(|observer| observer.root_count() > 0);
    if is_root && (key.starts_with('$') || key.starts_with('_')) {
        Runtime::diagnostic(
            &format!("Reactive key \"{key}\" uses a reserved prefix on a root-level record"),
            key,
        );
    }
    record.install_slot(key, Slot::reactive(value.into(), options));
    Ok(())
}

/// Whether containers are currently allowed to become observed.
pub fn is_observing() -> bool {
    OBSERVING.with(Cell::get)
}

/// Guard that sets the observation flag and restores the previous value on
/// drop.
pub struct ObservationGuard {
    previous: bool,
}

impl ObservationGuard {
    pub fn new(enabled: bool) -> Self {
        let previous = OBSERVING.with(|flag| flag.replace(enabled));
        Self { previous }
    }
}

impl Drop for ObservationGuard {
    fn drop(&mut self) {
        OBSERVING.with(|flag| flag.set(self.previous));
    }
}

/// Run `f` with observation disabled.
pub fn without_observation<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ObservationGuard::new(false);
    f()
}

/// Track the shape dependency of every observed element of `list`,
/// recursing into nested lists. Each list is visited once, so lists that
/// contain themselves terminate.
pub(crate) fn depend_array(list: &List) {
    let mut seen = HashSet::new();
    seen.insert(list.address());
    depend_items(list, &mut seen);
}

fn depend_items(list: &List, seen: &mut HashSet<usize>) {
    for item in list.to_vec_untracked() {
        if let Some(observer) = item.observer() {
            observer.dependency().track();
        }
        if let Value::List(nested) = &item {
            if seen.insert(nested.address()) {
                depend_items(nested, seen);
            }
        }
    }
}

/// One stored value, optionally guarded by a dependency.
pub(crate) struct Slot {
    value: RefCell<Value>,
    dep: Option<Dependency>,
    shallow: bool,
    readonly: bool,
}

impl Slot {
    pub(crate) fn plain(value: Value) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(value),
            dep: None,
            shallow: false,
            readonly: false,
        })
    }

    pub(crate) fn reactive(value: Value, options: ReactiveOptions) -> Rc<Self> {
        Self::with_dependency(value, Dependency::new(), options)
    }

    pub(crate) fn with_dependency(value: Value, dep: Dependency, options: ReactiveOptions) -> Rc<Self> {
        if !options.shallow {
            observe(&value, false);
        }
        Rc::new(Self {
            value: RefCell::new(value),
            dep: Some(dep),
            shallow: options.shallow,
            readonly: options.readonly,
        })
    }

    pub(crate) fn is_reactive(&self) -> bool {
        self.dep.is_some()
    }

    pub(crate) fn dependency(&self) -> Option<&Dependency> {
        self.dep.as_ref()
    }

    pub(crate) fn read(&self) -> Value {
        let value = self.read_untracked();
        if let Some(dep) = &self.dep {
            if ReactiveContext::is_active() {
                dep.track();
                if !self.shallow {
                    if let Some(observer) = value.observer() {
                        observer.dependency().track();
                        if let Value::List(list) = &value {
                            depend_array(list);
                        }
                    }
                }
            }
        }
        value
    }

    pub(crate) fn read_untracked(&self) -> Value {
        self.value.borrow().clone()
    }

    /// Store `value`, notifying the slot's dependency if it changed.
    /// `name` identifies the slot in diagnostics.
    pub(crate) fn write(&self, value: Value, name: &str) -> Result<()> {
        let Some(dep) = &self.dep else {
            *self.value.borrow_mut() = value;
            return Ok(());
        };
        if self.value.borrow().same_value(&value) {
            return Ok(());
        }
        if self.readonly {
            Runtime::diagnostic(
                &format!("Avoid mutating read-only value \"{name}\"; it will be overwritten by its owner"),
                name,
            );
        }
        if !self.shallow {
            observe(&value, false);
        }
        *self.value.borrow_mut() = value;
        dep.notify()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_is_idempotent() {
        let value = Value::from(Record::new().with("a", 1));
        let first = observe(&value, false).expect("records are observable");
        let second = observe(&value, false).expect("still observed");
        assert_eq!(first.dependency().id(), second.dependency().id());
    }

    #[test]
    fn observe_converts_nested_containers() {
        let inner = Record::new().with("v", 1);
        let outer = Record::new().with("nested", inner.clone());
        observe(&Value::from(outer.clone()), false);

        assert!(outer.observer().is_some());
        assert!(inner.observer().is_some());
    }

    #[test]
    fn root_attachments_are_counted() {
        let value = Value::from(Record::new());
        observe(&value, true);
        let observer = observe(&value, true).unwrap();
        assert_eq!(observer.root_count(), 2);

        observer.release_root();
        assert_eq!(observer.root_count(), 1);
    }

    #[test]
    fn scalars_frozen_and_raw_values_are_not_observed() {
        assert!(observe(&Value::from(1), false).is_none());

        let frozen = Record::new();
        frozen.freeze();
        assert!(observe(&Value::from(frozen), false).is_none());

        let raw = List::new();
        raw.mark_raw();
        assert!(observe(&Value::from(raw), false).is_none());
    }

    #[test]
    fn disabled_observation_skips_attachment() {
        let value = Value::from(Record::new());
        let observer = without_observation(|| observe(&value, false));
        assert!(observer.is_none());
        assert!(is_observing());
        assert!(observe(&value, false).is_some());
    }

    #[test]
    fn nan_over_nan_does_not_notify() {
        let slot = Slot::reactive(Value::from(f64::NAN), ReactiveOptions::default());
        let dep = slot.dependency().unwrap().clone();
        let watcher = crate::reactive::Watcher::new(
            {
                let slot = slot.clone();
                move || Ok(slot.read())
            },
            None,
            crate::reactive::WatcherOptions::default(),
        )
        .unwrap();
        assert_eq!(dep.subscriber_count(), 1);

        slot.write(Value::from(f64::NAN), "n").unwrap();
        assert_eq!(crate::scheduler::pending_len(), 0);
        drop(watcher);
    }

    #[test]
    fn reading_a_self_containing_list_terminates() {
        let list = List::new();
        list.observe(false);
        list.push(list.clone()).unwrap();
        let inner = List::new();
        inner.push(list.clone()).unwrap();
        list.push(inner.clone()).unwrap();

        let slot = Slot::reactive(Value::from(list.clone()), ReactiveOptions::default());
        let watcher = crate::reactive::Watcher::new(
            {
                let slot = slot.clone();
                move || Ok(slot.read())
            },
            None,
            crate::reactive::WatcherOptions::default(),
        )
        .unwrap();

        let shape = list.observer().unwrap();
        assert_eq!(shape.dependency().subscriber_count(), 1);
        assert_eq!(inner.observer().unwrap().dependency().subscriber_count(), 1);
        watcher.teardown();
    }

    #[test]
    fn shallow_slots_leave_values_unobserved() {
        let record = Record::new();
        let slot = Slot::reactive(
            Value::from(record.clone()),
            ReactiveOptions {
                shallow: true,
                ..ReactiveOptions::default()
            },
        );
        assert!(slot.is_reactive());
        assert!(record.observer().is_none());
    }
}
