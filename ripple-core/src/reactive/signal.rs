//! Signal Implementation
//!
//! A Signal is a standalone reactive cell: one value guarded by one
//! dependency, not owned by any record. It is the explicit `get`/`set`
//! accessor form of a reactive property.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a watcher is evaluating, the watcher
//!    subscribes to the signal's dependency.
//!
//! 2. When a write changes the value (by [`Value::same_value`]), the
//!    dependency notifies every subscriber.
//!
//! 3. Containers stored in a signal are observed, so reading the signal also
//!    subscribes to the container's shape.

use std::fmt::Debug;
use std::rc::Rc;

use super::dependency::{DepId, Dependency};
use super::observer::{ReactiveOptions, Slot};
use crate::error::Result;
use crate::value::Value;

/// A reactive cell holding a [`Value`].
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5).unwrap();
/// assert_eq!(count.get().as_number(), Some(5.0));
/// ```
#[derive(Clone)]
pub struct Signal {
    /// Guards `slot`.
    dep: Dependency,
    slot: Rc<Slot>,
}

impl Signal {
    /// Create a new signal with the given initial value.
    pub fn new(value: impl Into<Value>) -> Self {
        Self::with_options(value, ReactiveOptions::default())
    }

    /// Create a signal that never observes the containers it stores.
    pub fn shallow(value: impl Into<Value>) -> Self {
        Self::with_options(
            value,
            ReactiveOptions {
                shallow: true,
                ..ReactiveOptions::default()
            },
        )
    }

    fn with_options(value: impl Into<Value>, options: ReactiveOptions) -> Self {
        let dep = Dependency::new();
        let slot = Slot::with_dependency(value.into(), dep.clone(), options);
        Self { dep, slot }
    }

    /// Get the id of the signal's dependency.
    pub fn id(&self) -> DepId {
        self.dep.id()
    }

    /// Get the current value, tracking it if a watcher is evaluating.
    pub fn get(&self) -> Value {
        self.slot.read()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> Value {
        self.slot.read_untracked()
    }

    /// Set a new value and notify subscribers if it changed.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.slot.write(value.into(), "signal")
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.get_untracked());
        self.set(next)
    }

    pub fn dependency(&self) -> &Dependency {
        &self.dep
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.dep.subscriber_count()
    }
}

impl Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.dep.id())
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
