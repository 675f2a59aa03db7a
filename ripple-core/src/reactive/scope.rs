//! Scopes
//!
//! A [`Scope`] is the owner boundary for a group of watchers, the role a
//! component plays in a UI framework. It holds:
//!
//! - one root data record, observed as a root so its key set is fixed
//! - named memos, where redefining a name tears down the superseded memo
//! - explicit watches
//! - at most one render effect, plus `before_update`, `updated` and
//!   `activated` hooks around it
//!
//! Destroying the scope tears down everything it owns in one pass. Watchers
//! torn down individually ask the scope to forget them; during destruction
//! that bookkeeping is skipped because the whole registry is dropped anyway.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::debug;

use super::context::ReactiveContext;
use super::effect::Effect;
use super::memo::{Memo, Setter};
use super::record::Record;
use super::runtime::Runtime;
use super::watch::{path_getter, watch_with_owner, WatchOptions};
use super::watcher::{BeforeHook, Getter, Watcher, WatcherId, WatcherOwner};
use crate::error::{ReactiveError, Result};
use crate::scheduler;
use crate::value::Value;

/// A lifecycle hook.
pub type Hook = Rc<dyn Fn() -> Result<()>>;

struct ScopeInner {
    label: String,
    data: RefCell<Option<Record>>,
    watchers: RefCell<IndexMap<WatcherId, Watcher>>,
    memos: RefCell<IndexMap<String, Memo>>,
    render: RefCell<Option<Effect>>,
    before_update: RefCell<Vec<Hook>>,
    updated: RefCell<Vec<Hook>>,
    activated: RefCell<Vec<Hook>>,
    mounted: Cell<bool>,
    inactive: Cell<bool>,
    being_destroyed: Cell<bool>,
    destroyed: Cell<bool>,
}

impl ScopeInner {
    fn is_live(&self) -> bool {
        self.mounted.get() && !self.destroyed.get()
    }

    /// Run hooks untracked, reporting failures.
    fn run_hooks(&self, hooks: &RefCell<Vec<Hook>>, name: &str) {
        let hooks = hooks.borrow().clone();
        for hook in hooks {
            if let Err(err) = ReactiveContext::untracked(|| hook()) {
                Runtime::report_error(&err, &format!("{name} hook of \"{}\"", self.label));
            }
        }
    }
}

impl WatcherOwner for ScopeInner {
    fn is_being_destroyed(&self) -> bool {
        self.being_destroyed.get()
    }

    fn forget_watcher(&self, id: WatcherId) {
        self.watchers.borrow_mut().shift_remove(&id);
        self.memos
            .borrow_mut()
            .retain(|_, memo| memo.watcher().id() != id);
    }

    fn after_flush(&self, watcher: &Watcher) {
        let is_render = self
            .render
            .borrow()
            .as_ref()
            .is_some_and(|render| render.id() == watcher.id());
        if is_render && self.is_live() {
            self.run_hooks(&self.updated, "updated");
        }
    }
}

/// An owner of watchers with a fixed root record and a render effect.
///
/// Cloning a `Scope` creates another handle to the same scope. Dropping the
/// last handle drops every watcher it owns.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                label: label.into(),
                data: RefCell::new(None),
                watchers: RefCell::new(IndexMap::new()),
                memos: RefCell::new(IndexMap::new()),
                render: RefCell::new(None),
                before_update: RefCell::new(Vec::new()),
                updated: RefCell::new(Vec::new()),
                activated: RefCell::new(Vec::new()),
                mounted: Cell::new(false),
                inactive: Cell::new(false),
                being_destroyed: Cell::new(false),
                destroyed: Cell::new(false),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    fn owner(&self) -> Weak<dyn WatcherOwner> {
        let weak: Weak<ScopeInner> = Rc::downgrade(&self.inner);
        weak
    }

    /// Install `record` as the scope's root data and observe it as a root.
    ///
    /// Keys starting with `$` or `_` are reported: they are reserved for the
    /// engine and are not reachable through [`Scope::get`].
    pub fn set_data(&self, record: Record) {
        for key in record.keys_untracked() {
            if is_reserved(&key) {
                Runtime::diagnostic(
                    &format!(
                        "Data key \"{key}\" starts with a reserved prefix and is not proxied by scope \"{}\"",
                        self.inner.label
                    ),
                    &key,
                );
            }
        }
        record.observe(true);
        if let Some(previous) = self.inner.data.replace(Some(record)) {
            release_root(&previous);
        }
    }

    pub fn data(&self) -> Option<Record> {
        self.inner.data.borrow().clone()
    }

    /// Read a data field, tracked.
    pub fn get(&self, key: &str) -> Option<Value> {
        if is_reserved(key) {
            return None;
        }
        self.data()?.get(key)
    }

    /// Write a data field. The root record refuses new keys, and a scope
    /// without data refuses every write.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let data = self
            .data()
            .ok_or_else(|| ReactiveError::MissingData(self.inner.label.clone()))?;
        data.set(key, value)
    }

    /// Register a user watch owned by this scope.
    pub fn watch<G, C>(&self, getter: G, callback: C, options: WatchOptions) -> Result<Watcher>
    where
        G: Fn() -> Result<Value> + 'static,
        C: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        self.adopt(watch_with_owner(
            Rc::new(getter),
            Rc::new(callback),
            options,
            None,
            Some(self.owner()),
        )?)
    }

    /// Watch a dotted path into the scope's data.
    pub fn watch_path<C>(&self, path: &str, callback: C, options: WatchOptions) -> Result<Watcher>
    where
        C: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        let getter = path_getter(&self.data().unwrap_or_default(), path)?;
        self.adopt(watch_with_owner(
            getter,
            Rc::new(callback),
            options,
            Some(format!("{}: watch \"{path}\"", self.inner.label)),
            Some(self.owner()),
        )?)
    }

    fn adopt(&self, watcher: Watcher) -> Result<Watcher> {
        self.inner
            .watchers
            .borrow_mut()
            .insert(watcher.id(), watcher.clone());
        Ok(watcher)
    }

    /// Define a named memo, replacing any memo of the same name.
    pub fn memo<F>(&self, name: &str, compute: F) -> Memo
    where
        F: Fn() -> Result<Value> + 'static,
    {
        self.define_memo(name, Rc::new(compute), None)
    }

    /// Define a named memo with a setter.
    pub fn memo_with_setter<F, S>(&self, name: &str, compute: F, setter: S) -> Memo
    where
        F: Fn() -> Result<Value> + 'static,
        S: Fn(Value) -> Result<()> + 'static,
    {
        let setter: Setter = Rc::new(setter);
        self.define_memo(name, Rc::new(compute), Some(setter))
    }

    fn define_memo(&self, name: &str, compute: Getter, setter: Option<Setter>) -> Memo {
        let collides = self
            .data()
            .is_some_and(|data| data.keys_untracked().iter().any(|key| key == name));
        if collides {
            Runtime::diagnostic(
                &format!(
                    "Memo \"{name}\" is already defined in the data of scope \"{}\"",
                    self.inner.label
                ),
                name,
            );
        }

        let memo = Memo::with_options(
            compute,
            setter,
            Some(format!("{}.{name}", self.inner.label)),
            Some(self.owner()),
        );
        let superseded = self
            .inner
            .memos
            .borrow_mut()
            .insert(name.to_string(), memo.clone());
        if let Some(old) = superseded {
            old.dispose();
        }
        memo
    }

    /// Look up a memo by name.
    pub fn get_memo(&self, name: &str) -> Option<Memo> {
        self.inner.memos.borrow().get(name).cloned()
    }

    /// Mount the render effect. It runs once now and again in every flush
    /// after its dependencies change, preceded by the `before_update` hooks
    /// and followed by the `updated` hooks.
    ///
    /// Mounting again replaces the previous render effect.
    pub fn mount<F>(&self, render: F) -> Result<()>
    where
        F: Fn() -> Result<()> + 'static,
    {
        let weak = Rc::downgrade(&self.inner);
        let before: BeforeHook = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                if inner.is_live() {
                    inner.run_hooks(&inner.before_update, "before_update");
                }
            }
        });

        let effect = Effect::render(
            render,
            format!("{}: render", self.inner.label),
            before,
            self.owner(),
        )?;
        if let Some(previous) = self.inner.render.replace(Some(effect)) {
            previous.dispose();
        }
        self.inner.mounted.set(true);
        Ok(())
    }

    pub fn render_effect(&self) -> Option<Effect> {
        self.inner.render.borrow().clone()
    }

    pub fn on_before_update(&self, hook: impl Fn() -> Result<()> + 'static) {
        self.inner.before_update.borrow_mut().push(Rc::new(hook));
    }

    pub fn on_updated(&self, hook: impl Fn() -> Result<()> + 'static) {
        self.inner.updated.borrow_mut().push(Rc::new(hook));
    }

    pub fn on_activated(&self, hook: impl Fn() -> Result<()> + 'static) {
        self.inner.activated.borrow_mut().push(Rc::new(hook));
    }

    /// Mark the scope active again. The `activated` hooks run after the
    /// next flush.
    pub fn activate(&self) -> Result<()> {
        let weak = Rc::downgrade(&self.inner);
        scheduler::queue_activated(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                if !inner.destroyed.get() {
                    inner.inactive.set(false);
                    inner.run_hooks(&inner.activated, "activated");
                }
            }
        }))
    }

    /// Mark the scope inactive. Its watchers keep running.
    pub fn deactivate(&self) {
        self.inner.inactive.set(true);
    }

    pub fn is_inactive(&self) -> bool {
        self.inner.inactive.get()
    }

    /// Tear down every watcher the scope owns and release its root data.
    /// Idempotent.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.being_destroyed.replace(true) {
            return;
        }

        let render = inner.render.borrow_mut().take();
        if let Some(render) = render {
            render.dispose();
        }
        let watchers = std::mem::take(&mut *inner.watchers.borrow_mut());
        for watcher in watchers.values() {
            watcher.teardown();
        }
        let memos = std::mem::take(&mut *inner.memos.borrow_mut());
        for memo in memos.values() {
            memo.dispose();
        }
        let data = inner.data.borrow_mut().take();
        if let Some(data) = data {
            release_root(&data);
        }

        inner.destroyed.set(true);
        inner.mounted.set(false);
        debug!(
            scope = %inner.label,
            watchers = watchers.len(),
            memos = memos.len(),
            "destroyed scope"
        );
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    /// Number of explicit watches the scope owns.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    pub fn memo_count(&self) -> usize {
        self.inner.memos.borrow().len()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("label", &self.inner.label)
            .field("mounted", &self.is_mounted())
            .field("destroyed", &self.is_destroyed())
            .field("watchers", &self.watcher_count())
            .field("memos", &self.memo_count())
            .finish()
    }
}

fn is_reserved(key: &str) -> bool {
    key.starts_with('$') || key.starts_with('_')
}

fn release_root(record: &Record) {
    if let Some(observer) = record.observer() {
        observer.release_root();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
