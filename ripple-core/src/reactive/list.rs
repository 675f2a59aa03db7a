//! Observable Lists
//!
//! [`List`] is the explicit mutation surface for sequences. Every mutating
//! method performs the change, observes any newly inserted elements, and
//! notifies the list's shape dependency. Reads through the wrapper track
//! that same dependency.
//!
//! [`List::raw_set`] is the one deliberate exception: it writes an element
//! in place without notifying, the way a plain index assignment would. Use
//! [`List::set_index`] when readers must see the write.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::observer::{observe, Flags, Observer};
use crate::error::{ReactiveError, Result};
use crate::value::Value;

struct ListInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Observer>>,
    flags: Cell<Flags>,
}

/// A shared list with an explicit, notifying mutation surface.
///
/// Cloning a `List` creates another handle to the same list.
#[derive(Clone)]
pub struct List {
    inner: Rc<ListInner>,
}

impl List {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    /// Whether two handles refer to the same list.
    pub fn ptr_eq(&self, other: &List) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn observer(&self) -> Option<Observer> {
        self.inner.observer.borrow().clone()
    }

    /// Observe this list. See [`observe`].
    pub fn observe(&self, as_root: bool) -> Option<Observer> {
        observe(&Value::List(self.clone()), as_root)
    }

    pub fn freeze(&self) {
        let mut flags = self.inner.flags.get();
        flags.frozen = true;
        self.inner.flags.set(flags);
    }

    pub fn mark_raw(&self) {
        let mut flags = self.inner.flags.get();
        flags.raw = true;
        self.inner.flags.set(flags);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.flags.get().frozen
    }

    pub fn is_raw(&self) -> bool {
        self.inner.flags.get().raw
    }

    fn track_shape(&self) {
        if let Some(observer) = self.observer() {
            observer.dependency().track();
        }
    }

    /// Number of elements, tracking the shape dependency.
    pub fn len(&self) -> usize {
        self.track_shape();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, tracking the shape dependency.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.track_shape();
        self.inner.items.borrow().get(index).cloned()
    }

    /// Snapshot of all elements, tracking the shape dependency.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track_shape();
        self.to_vec_untracked()
    }

    pub fn to_vec_untracked(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn attach_observer(&self, observer: Observer) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    /// Apply `op` to the items, then observe `inserted` and notify.
    fn mutate<R>(&self, inserted: &[Value], op: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        if self.is_frozen() {
            return Err(ReactiveError::Frozen("list"));
        }
        let out = {
            let mut items = self.inner.items.borrow_mut();
            op(&mut *items)
        };
        if let Some(observer) = self.observer() {
            for value in inserted {
                observe(value, false);
            }
            observer.dependency().notify()?;
        }
        Ok(out)
    }

    /// Insert at the end.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.mutate(std::slice::from_ref(&value), |items| items.push(value.clone()))
    }

    /// Remove from the end.
    pub fn pop(&self) -> Result<Option<Value>> {
        self.mutate(&[], Vec::pop)
    }

    /// Remove from the front.
    pub fn shift(&self) -> Result<Option<Value>> {
        self.mutate(&[], |items| (!items.is_empty()).then(|| items.remove(0)))
    }

    /// Insert at the front.
    pub fn unshift(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.mutate(std::slice::from_ref(&value), |items| items.insert(0, value.clone()))
    }

    /// Remove `delete_count` elements starting at `start` and insert `items`
    /// in their place. Out-of-range arguments are clamped. Returns the
    /// removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Result<Vec<Value>> {
        self.mutate(&items, |current| {
            let start = start.min(current.len());
            let end = start + delete_count.min(current.len() - start);
            current.splice(start..end, items.iter().cloned()).collect()
        })
    }

    /// Sort with a comparator. The comparator runs on a copy, so it may read
    /// this list.
    pub fn sort_by<F>(&self, compare: F) -> Result<()>
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let mut sorted = self.to_vec_untracked();
        sorted.sort_by(compare);
        self.mutate(&[], move |items| *items = sorted)
    }

    /// Reverse in place.
    pub fn reverse(&self) -> Result<()> {
        self.mutate(&[], |items| items.reverse())
    }

    /// Write `value` at `index` through the mutation surface, growing the
    /// list with nulls if needed.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        if self.is_frozen() {
            return Err(ReactiveError::Frozen("list"));
        }
        {
            let mut items = self.inner.items.borrow_mut();
            if index > items.len() {
                items.resize(index, Value::Null);
            }
        }
        self.splice(index, 1, vec![value.into()]).map(drop)
    }

    /// Remove the element at `index` through the mutation surface.
    pub fn remove_at(&self, index: usize) -> Result<Option<Value>> {
        Ok(self.splice(index, 1, Vec::new())?.into_iter().next())
    }

    /// Write an element in place without observing or notifying.
    pub fn raw_set(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        if self.is_frozen() {
            return Err(ReactiveError::Frozen("list"));
        }
        let mut items = self.inner.items.borrow_mut();
        let len = items.len();
        let slot = items
            .get_mut(index)
            .ok_or(ReactiveError::IndexOutOfBounds { index, len })?;
        *slot = value.into();
        Ok(())
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ListInner {
                items: RefCell::new(items),
                observer: RefCell::new(None),
                flags: Cell::new(Flags::default()),
            }),
        }
    }
}

impl<V: Into<Value>> FromIterator<V> for List {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec_untracked()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
