//! Records
//!
//! A [`Record`] is an insertion-ordered map from keys to slots. Until it is
//! observed its slots are plain storage; once observed, every slot is
//! reactive and field reads and writes route through dependencies.
//!
//! Adding or removing keys on an observed record notifies its shape
//! dependency. Records used as an owner's root refuse structural edits:
//! everything they hold must be declared up front.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::observer::{observe, Flags, Observer, ReactiveOptions, Slot};
use super::runtime::Runtime;
use crate::error::{ReactiveError, Result};
use crate::value::Value;

struct RecordInner {
    fields: RefCell<IndexMap<String, Rc<Slot>>>,
    observer: RefCell<Option<Observer>>,
    flags: Cell<Flags>,
}

/// A shared, insertion-ordered record of named values.
///
/// Cloning a `Record` creates another handle to the same record.
#[derive(Clone)]
pub struct Record {
    inner: Rc<RecordInner>,
}

impl Record {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RecordInner {
                fields: RefCell::new(IndexMap::new()),
                observer: RefCell::new(None),
                flags: Cell::new(Flags::default()),
            }),
        }
    }

    /// Builder-style insert that never notifies.
    ///
    /// Meant for constructing data before it is observed; on an observed
    /// record the new field is reactive.
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key: String = key.into();
        let value = value.into();
        let slot = if self.observer().is_some() {
            Slot::reactive(value, ReactiveOptions::default())
        } else {
            Slot::plain(value)
        };
        self.install_slot(&key, slot);
        self
    }

    /// Whether two handles refer to the same record.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn observer(&self) -> Option<Observer> {
        self.inner.observer.borrow().clone()
    }

    /// Observe this record. See [`observe`].
    pub fn observe(&self, as_root: bool) -> Option<Observer> {
        observe(&Value::Record(self.clone()), as_root)
    }

    /// Make the record non-extensible: it will not be observed and
    /// mutations are rejected.
    pub fn freeze(&self) {
        self.update_flags(|flags| flags.frozen = true);
    }

    /// Mark the record as not plain data so it is never observed.
    pub fn mark_raw(&self) {
        self.update_flags(|flags| flags.raw = true);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.flags.get().frozen
    }

    pub fn is_raw(&self) -> bool {
        self.inner.flags.get().raw
    }

    /// Read a field, tracking it if the slot is reactive.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.slot(key).map(|slot| slot.read())
    }

    /// Read a field without tracking.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        self.slot(key).map(|slot| slot.read_untracked())
    }

    /// Write a field.
    ///
    /// Existing fields follow the change-detection rule. A new key on an
    /// observed record becomes a reactive field and notifies the shape
    /// dependency; on a root record it is refused.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if self.is_frozen() {
            return Err(ReactiveError::Frozen("record"));
        }
        if let Some(slot) = self.slot(key) {
            return slot.write(value, key);
        }

        let Some(observer) = self.observer() else {
            self.install_slot(key, Slot::plain(value));
            return Ok(());
        };
        self.check_structural_edit(&observer, key, "adding")?;
        self.install_slot(key, Slot::reactive(value, ReactiveOptions::default()));
        observer.dependency().notify()
    }

    /// Remove a field, notifying the shape dependency if observed.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        if self.is_frozen() {
            return Err(ReactiveError::Frozen("record"));
        }
        let observer = self.observer();
        if let Some(observer) = &observer {
            self.check_structural_edit(observer, key, "deleting")?;
        }

        let removed = self.inner.fields.borrow_mut().shift_remove(key);
        let Some(slot) = removed else {
            return Ok(None);
        };
        if let Some(observer) = observer {
            observer.dependency().notify()?;
        }
        Ok(Some(slot.read_untracked()))
    }

    fn check_structural_edit(&self, observer: &Observer, key: &str, verb: &str) -> Result<()> {
        if observer.root_count() == 0 {
            return Ok(());
        }
        Runtime::diagnostic(
            &format!(
                "Avoid {verb} reactive properties on a root-level record at runtime; declare \"{key}\" up front"
            ),
            key,
        );
        Err(ReactiveError::RootMutation {
            key: key.to_string(),
        })
    }

    /// Field names, tracking the shape dependency.
    pub fn keys(&self) -> Vec<String> {
        self.track_shape();
        self.keys_untracked()
    }

    pub fn keys_untracked(&self) -> Vec<String> {
        self.inner.fields.borrow().keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.track_shape();
        self.inner.fields.borrow().contains_key(key)
    }

    /// Number of fields, tracking the shape dependency.
    pub fn len(&self) -> usize {
        self.track_shape();
        self.inner.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all fields without tracking.
    pub fn entries_untracked(&self) -> Vec<(String, Value)> {
        self.inner
            .fields
            .borrow()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.read_untracked()))
            .collect()
    }

    /// Whether `key` holds a reactive slot.
    pub fn is_reactive_field(&self, key: &str) -> bool {
        self.slot(key).is_some_and(|slot| slot.is_reactive())
    }

    fn track_shape(&self) {
        if let Some(observer) = self.observer() {
            observer.dependency().track();
        }
    }

    fn update_flags(&self, f: impl FnOnce(&mut Flags)) {
        let mut flags = self.inner.flags.get();
        f(&mut flags);
        self.inner.flags.set(flags);
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn slot(&self, key: &str) -> Option<Rc<Slot>> {
        self.inner.fields.borrow().get(key).cloned()
    }

    pub(crate) fn install_slot(&self, key: &str, slot: Rc<Slot>) {
        self.inner.fields.borrow_mut().insert(key.to_string(), slot);
    }

    pub(crate) fn attach_observer(&self, observer: Observer) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    /// Convert every plain slot into a reactive one. Slots that are already
    /// reactive keep their dependency.
    pub(crate) fn make_slots_reactive(&self) {
        let plain: Vec<(String, Value)> = self
            .inner
            .fields
            .borrow()
            .iter()
            .filter(|(_, slot)| !slot.is_reactive())
            .map(|(key, slot)| (key.clone(), slot.read_untracked()))
            .collect();

        for (key, value) in plain {
            self.install_slot(&key, Slot::reactive(value, ReactiveOptions::default()));
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Record::new(), |record, (key, value)| record.with(key, value))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries_untracked()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Watcher, WatcherOptions};
    use std::cell::Cell;

    fn counting_sync_watcher(record: &Record, key: &'static str, runs: Rc<Cell<u32>>) -> Watcher {
        let record = record.clone();
        Watcher::new(
            move || {
                runs.set(runs.get() + 1);
                Ok(record.get(key).unwrap_or_default())
            },
            None,
            WatcherOptions {
                sync: true,
                ..WatcherOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn plain_records_store_without_tracking() {
        let record = Record::new().with("a", 1);
        record.set("a", 2).unwrap();
        record.set("b", 3).unwrap();

        assert_eq!(record.get("a"), Some(Value::from(2)));
        assert_eq!(record.keys_untracked(), vec!["a", "b"]);
        assert!(!record.is_reactive_field("a"));
    }

    #[test]
    fn observed_field_write_notifies_readers() {
        let record = Record::new().with("a", 1);
        record.observe(false);
        let runs = Rc::new(Cell::new(0));
        let _watcher = counting_sync_watcher(&record, "a", runs.clone());

        record.set("a", 2).unwrap();
        record.set("a", 2).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn adding_a_key_notifies_shape_readers() {
        let record = Record::new();
        record.observe(false);
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let source = record.clone();
        let _watcher = Watcher::new(
            move || {
                counter.set(counter.get() + 1);
                Ok(Value::from(source.len()))
            },
            None,
            WatcherOptions {
                sync: true,
                ..WatcherOptions::default()
            },
        )
        .unwrap();

        record.set("fresh", true).unwrap();
        assert!(record.is_reactive_field("fresh"));
        assert_eq!(runs.get(), 2);

        assert_eq!(record.remove("fresh").unwrap(), Some(Value::from(true)));
        assert_eq!(runs.get(), 3);
        assert_eq!(record.remove("missing").unwrap(), None);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn root_records_refuse_structural_edits() {
        let record = Record::new().with("a", 1);
        record.observe(true);

        let err = record.set("b", 2).unwrap_err();
        assert_eq!(err, ReactiveError::RootMutation { key: "b".into() });
        assert!(record.remove("a").is_err());

        // Existing fields stay writable.
        record.set("a", 5).unwrap();
        assert_eq!(record.get_untracked("a"), Some(Value::from(5)));
    }

    #[test]
    fn frozen_records_reject_writes() {
        let record = Record::new().with("a", 1);
        record.freeze();
        assert_eq!(record.set("a", 2), Err(ReactiveError::Frozen("record")));
        assert_eq!(record.get("a"), Some(Value::from(1)));
    }

    #[test]
    fn from_iter_preserves_order() {
        let record: Record = [("z", 1), ("a", 2)].into_iter().collect();
        assert_eq!(record.keys_untracked(), vec!["z", "a"]);
    }
}
