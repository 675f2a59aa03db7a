//! Watchers
//!
//! A [`Watcher`] is a unit of computation: a getter, the set of dependencies
//! the getter read on its most recent evaluation, and a reaction policy that
//! decides what happens when one of those dependencies notifies.
//!
//! # Reaction Policies
//!
//! - [`ReactionPolicy::Batched`]: the watcher is handed to the scheduler and
//!   re-runs once in the next flush, no matter how many times it was notified.
//! - [`ReactionPolicy::Sync`]: the watcher re-runs immediately inside the
//!   notifying write.
//! - [`ReactionPolicy::Lazy`]: the watcher caches its value. With nobody
//!   subscribed to it, a notification only marks it dirty and the next read
//!   recomputes. With subscribers, it recomputes eagerly and forwards the
//!   change through its own dependency.
//!
//! # Dependency Reconciliation
//!
//! Every evaluation collects dependencies into a pending set. Afterwards,
//! anything in the current set that was not read again is unsubscribed, and
//! the two sets are swapped. Dependencies are never merged across runs, so a
//! branch that stops being read stops notifying.
//!
//! # Lifecycle
//!
//! Active until [`Watcher::teardown`]. A torn-down watcher may still sit in a
//! flush that is already in progress; `run()` checks the flag and does
//! nothing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::dependency::{DepId, Dependency};
use super::runtime::Runtime;
use super::traverse::traverse;
use crate::error::Result;
use crate::scheduler;
use crate::value::Value;

/// Unique identifier for a watcher.
///
/// Ids increase monotonically, so ordering by id is ordering by creation.
/// The scheduler relies on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The computation a watcher evaluates.
pub type Getter = Rc<dyn Fn() -> Result<Value>>;

/// Reaction callback, invoked with `(new, old)`.
pub type Callback = Rc<dyn Fn(&Value, &Value) -> Result<()>>;

/// Hook run by the scheduler right before a watcher re-runs.
pub type BeforeHook = Rc<dyn Fn()>;

/// How a watcher reacts to a dependency change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionPolicy {
    Sync,
    Batched,
    Lazy,
}

/// Bookkeeping seam between a watcher and whatever owns it.
///
/// Owners hold strong handles to their watchers; dependencies only hold weak
/// ones. Teardown asks the owner to forget the watcher unless the owner is
/// already destroying itself, in which case it drops everything anyway.
pub trait WatcherOwner {
    /// Whether the owner is in the middle of its own teardown.
    fn is_being_destroyed(&self) -> bool;

    /// Drop the watcher from the owner's registry.
    fn forget_watcher(&self, id: WatcherId);

    /// Called after a flush for each render watcher the flush ran.
    fn after_flush(&self, _watcher: &Watcher) {}
}

/// Construction options for a [`Watcher`].
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Force-track every member reachable from the computed value.
    pub deep: bool,
    /// Errors from the getter and callback are reported, not propagated.
    pub user: bool,
    /// React synchronously instead of batching.
    pub sync: bool,
    /// Cache the value and recompute on demand.
    pub lazy: bool,
    /// This watcher renders its owner.
    pub render: bool,
    /// Pre-run hook, called by the scheduler.
    pub before: Option<BeforeHook>,
    /// Human-readable description used in reports.
    pub label: Option<String>,
    pub owner: Option<Weak<dyn WatcherOwner>>,
}

pub(crate) struct WatcherInner {
    id: WatcherId,
    label: String,
    policy: ReactionPolicy,
    deep: bool,
    user: bool,
    render: bool,
    getter: Getter,
    callback: Option<Callback>,
    before: Option<BeforeHook>,
    owner: Option<Weak<dyn WatcherOwner>>,
    active: Cell<bool>,
    dirty: Cell<bool>,
    value: RefCell<Value>,
    deps: RefCell<IndexMap<DepId, Dependency>>,
    new_deps: RefCell<IndexMap<DepId, Dependency>>,
    /// Present only for lazy watchers.
    own_dep: Option<Dependency>,
}

/// A computation plus its current dependencies and reaction policy.
///
/// Cloning a `Watcher` creates another handle to the same computation.
/// Dependencies hold watchers weakly, so dropping every handle detaches it.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher.
    ///
    /// Non-lazy watchers evaluate immediately to collect their initial
    /// dependencies. A failing getter on a non-user watcher is returned as
    /// an error.
    pub fn new<G>(getter: G, callback: Option<Callback>, options: WatcherOptions) -> Result<Self>
    where
        G: Fn() -> Result<Value> + 'static,
    {
        let watcher = Self::build(Rc::new(getter), callback, options);
        if watcher.inner.policy != ReactionPolicy::Lazy {
            let value = watcher.evaluate()?;
            *watcher.inner.value.borrow_mut() = value;
        }
        Ok(watcher)
    }

    /// Create a watcher without evaluating it.
    pub(crate) fn build(getter: Getter, callback: Option<Callback>, options: WatcherOptions) -> Self {
        let policy = if options.lazy {
            ReactionPolicy::Lazy
        } else if options.sync {
            ReactionPolicy::Sync
        } else {
            ReactionPolicy::Batched
        };
        let id = WatcherId::next();
        let label = options
            .label
            .unwrap_or_else(|| format!("watcher#{}", id.raw()));

        trace!(watcher = id.raw(), ?policy, %label, "created watcher");

        Self {
            inner: Rc::new(WatcherInner {
                id,
                label,
                policy,
                deep: options.deep,
                user: options.user,
                render: options.render,
                getter,
                callback,
                before: options.before,
                owner: options.owner,
                active: Cell::new(true),
                dirty: Cell::new(policy == ReactionPolicy::Lazy),
                value: RefCell::new(Value::Null),
                deps: RefCell::new(IndexMap::new()),
                new_deps: RefCell::new(IndexMap::new()),
                own_dep: (policy == ReactionPolicy::Lazy).then(Dependency::new),
            }),
        }
    }

    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn policy(&self) -> ReactionPolicy {
        self.inner.policy
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn is_deep(&self) -> bool {
        self.inner.deep
    }

    pub fn is_user(&self) -> bool {
        self.inner.user
    }

    pub fn is_render(&self) -> bool {
        self.inner.render
    }

    /// The cached value from the last evaluation.
    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Ids of the dependencies read during the most recent evaluation.
    pub fn dependency_ids(&self) -> Vec<DepId> {
        self.inner.deps.borrow().keys().copied().collect()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// The watcher's own dependency (lazy watchers only).
    pub fn own_dependency(&self) -> Option<&Dependency> {
        self.inner.own_dep.as_ref()
    }

    pub fn owner(&self) -> Option<Rc<dyn WatcherOwner>> {
        self.inner.owner.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn downgrade(&self) -> Weak<WatcherInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<WatcherInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Run the getter inside this watcher's reactive context and reconcile
    /// dependencies afterwards.
    pub fn evaluate(&self) -> Result<Value> {
        self.inner.new_deps.borrow_mut().clear();

        let result = {
            let _ctx = ReactiveContext::enter(self.clone());
            let getter = Rc::clone(&self.inner.getter);
            match getter() {
                Ok(value) => {
                    if self.inner.deep {
                        traverse(&value);
                    }
                    Ok(value)
                }
                Err(err) if self.inner.user => {
                    Runtime::report_error(
                        &err,
                        &format!("getter for watcher \"{}\"", self.inner.label),
                    );
                    Ok(self.value())
                }
                Err(err) => Err(err),
            }
        };

        self.cleanup_deps();
        result
    }

    /// Record a dependency read during the current evaluation.
    pub fn add_dependency(&self, dep: &Dependency) {
        let id = dep.id();
        {
            let mut new_deps = self.inner.new_deps.borrow_mut();
            if new_deps.contains_key(&id) {
                return;
            }
            new_deps.insert(id, dep.clone());
        }
        if !self.inner.deps.borrow().contains_key(&id) {
            dep.subscribe(self);
        }
    }

    fn cleanup_deps(&self) {
        let stale: SmallVec<[Dependency; 4]> = {
            let deps = self.inner.deps.borrow();
            let new_deps = self.inner.new_deps.borrow();
            deps.iter()
                .filter(|(id, _)| !new_deps.contains_key(*id))
                .map(|(_, dep)| dep.clone())
                .collect()
        };
        for dep in &stale {
            dep.unsubscribe(self.inner.id);
        }

        let mut deps = self.inner.deps.borrow_mut();
        let mut new_deps = self.inner.new_deps.borrow_mut();
        std::mem::swap(&mut *deps, &mut *new_deps);
        new_deps.clear();

        trace!(
            watcher = self.inner.id.raw(),
            deps = deps.len(),
            dropped = stale.len(),
            "reconciled dependencies"
        );
    }

    /// React to a dependency change according to the reaction policy.
    pub fn update(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        match self.inner.policy {
            ReactionPolicy::Lazy => match &self.inner.own_dep {
                Some(own_dep) if own_dep.subscriber_count() > 0 => {
                    self.evaluate_and_maybe_invoke(|_, _| own_dep.notify())
                }
                _ => {
                    self.inner.dirty.set(true);
                    Ok(())
                }
            },
            ReactionPolicy::Sync => self.run(),
            ReactionPolicy::Batched => scheduler::enqueue(self.clone()),
        }
    }

    /// Re-evaluate and invoke the reaction callback if the value changed.
    pub fn run(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let callback = self.inner.callback.clone();
        self.evaluate_and_maybe_invoke(|new, old| {
            let Some(callback) = callback else {
                return Ok(());
            };
            match callback(new, old) {
                Err(err) if self.inner.user => {
                    Runtime::report_error(
                        &err,
                        &format!("callback for watcher \"{}\"", self.inner.label),
                    );
                    Ok(())
                }
                result => result,
            }
        })
    }

    /// Evaluate, then call `callback(new, old)` when the value differs,
    /// is a container, or the watcher is deep.
    ///
    /// Containers always qualify because they compare by identity and may
    /// have been mutated in place.
    fn evaluate_and_maybe_invoke<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&Value, &Value) -> Result<()>,
    {
        let value = self.evaluate()?;
        let changed = !value.same_value(&self.inner.value.borrow())
            || value.is_container()
            || self.inner.deep;
        self.inner.dirty.set(false);

        if changed {
            let old = self.inner.value.replace(value.clone());
            callback(&value, &old)
        } else {
            Ok(())
        }
    }

    /// Return the cached value, recomputing first if dirty.
    pub fn evaluate_lazy(&self) -> Result<Value> {
        if self.inner.dirty.get() {
            let value = self.evaluate()?;
            *self.inner.value.borrow_mut() = value;
            self.inner.dirty.set(false);
        }
        Ok(self.value())
    }

    /// Make the watcher currently evaluating depend on this one's cached
    /// value (lazy watchers only).
    pub fn register_as_dependent(&self) {
        if let Some(own_dep) = &self.inner.own_dep {
            own_dep.track();
        }
    }

    pub(crate) fn call_before(&self) {
        if let Some(before) = &self.inner.before {
            before();
        }
    }

    /// Unsubscribe from every dependency and deactivate. Idempotent.
    pub fn teardown(&self) {
        if !self.inner.active.get() {
            return;
        }
        if let Some(owner) = self.owner() {
            if !owner.is_being_destroyed() {
                owner.forget_watcher(self.inner.id);
            }
        }

        let deps: SmallVec<[Dependency; 4]> = self.inner.deps.borrow().values().cloned().collect();
        for dep in &deps {
            dep.unsubscribe(self.inner.id);
        }
        self.inner.active.set(false);

        debug!(watcher = self.inner.id.raw(), label = %self.inner.label, "tore down watcher");
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("policy", &self.inner.policy)
            .field("active", &self.inner.active.get())
            .field("dirty", &self.inner.dirty.get())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::{Record, Signal};

    fn recorder() -> (Rc<RefCell<Vec<(Value, Value)>>>, Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let callback: Callback = Rc::new(move |new: &Value, old: &Value| {
            sink.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        });
        (log, callback)
    }

    fn sync_options() -> WatcherOptions {
        WatcherOptions {
            sync: true,
            ..WatcherOptions::default()
        }
    }

    #[test]
    fn watcher_ids_are_monotonic() {
        let a = Watcher::build(Rc::new(|| Ok(Value::Null)), None, WatcherOptions::default());
        let b = Watcher::build(Rc::new(|| Ok(Value::Null)), None, WatcherOptions::default());
        assert!(a.id() < b.id());
    }

    #[test]
    fn sync_watcher_invokes_callback_with_new_and_old() {
        let signal = Signal::new(1);
        let (log, callback) = recorder();
        let source = signal.clone();
        let _watcher = Watcher::new(move || Ok(source.get()), Some(callback), sync_options()).unwrap();

        signal.set(2).unwrap();
        assert_eq!(log.borrow().as_slice(), &[(Value::from(2), Value::from(1))]);
    }

    #[test]
    fn unchanged_scalar_skips_callback() {
        let signal = Signal::new(3);
        let (log, callback) = recorder();
        let source = signal.clone();
        let watcher = Watcher::new(
            move || Ok(Value::from(source.get().as_number().unwrap_or(0.0) > 0.0)),
            Some(callback),
            sync_options(),
        )
        .unwrap();

        signal.set(4).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(watcher.value(), Value::from(true));
    }

    #[test]
    fn stale_dependencies_are_dropped() {
        let toggle = Signal::new(true);
        let a = Signal::new("a");
        let b = Signal::new("b");
        let (t, x, y) = (toggle.clone(), a.clone(), b.clone());
        let watcher = Watcher::new(
            move || Ok(if t.get() == Value::from(true) { x.get() } else { y.get() }),
            None,
            sync_options(),
        )
        .unwrap();

        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 0);

        toggle.set(false).unwrap();
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
        assert_eq!(watcher.dependency_count(), 2);
    }

    #[test]
    fn teardown_unsubscribes_and_is_idempotent() {
        let signal = Signal::new(0);
        let (log, callback) = recorder();
        let source = signal.clone();
        let watcher = Watcher::new(move || Ok(source.get()), Some(callback), sync_options()).unwrap();

        watcher.teardown();
        watcher.teardown();
        assert!(!watcher.is_active());
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(9).unwrap();
        assert!(log.borrow().is_empty());
        watcher.run().unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn non_user_getter_error_propagates() {
        let result = Watcher::new(
            || Err(ReactiveError::computation("render failed")),
            None,
            WatcherOptions::default(),
        );
        assert_eq!(result.unwrap_err(), ReactiveError::computation("render failed"));
    }

    #[test]
    fn user_getter_error_keeps_previous_value() {
        let signal = Signal::new(1);
        let source = signal.clone();
        let watcher = Watcher::new(
            move || {
                let value = source.get();
                if value == Value::from(0) {
                    return Err(ReactiveError::computation("division by zero"));
                }
                Ok(value)
            },
            None,
            WatcherOptions {
                user: true,
                sync: true,
                ..WatcherOptions::default()
            },
        )
        .unwrap();

        signal.set(0).unwrap();
        assert_eq!(watcher.value(), Value::from(1));
        assert!(watcher.is_active());
    }

    #[test]
    fn lazy_watcher_starts_dirty_and_caches() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let watcher = Watcher::build(
            Rc::new(move || {
                counter.set(counter.get() + 1);
                Ok(Value::from(42))
            }),
            None,
            WatcherOptions {
                lazy: true,
                ..WatcherOptions::default()
            },
        );

        assert!(watcher.is_dirty());
        assert_eq!(runs.get(), 0);
        assert_eq!(watcher.evaluate_lazy().unwrap(), Value::from(42));
        assert_eq!(watcher.evaluate_lazy().unwrap(), Value::from(42));
        assert_eq!(runs.get(), 1);
        assert!(watcher.own_dependency().is_some());
    }

    #[test]
    fn container_values_always_invoke_callback() {
        let record = Record::new().with("v", 1);
        record.observe(false);
        let (log, callback) = recorder();
        let source = record.clone();
        let _watcher = Watcher::new(
            move || {
                source.get("v");
                Ok(Value::from(source.clone()))
            },
            Some(callback),
            sync_options(),
        )
        .unwrap();

        record.set("v", 2).unwrap();
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, Value::from(record.clone()));
        assert_eq!(log[0].1, Value::from(record));
    }
}
