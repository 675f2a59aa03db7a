//! Reactive Primitives
//!
//! This module implements the dependency-tracking half of the engine:
//! dependencies, observed containers, watchers and the facades built on
//! them.
//!
//! # Concepts
//!
//! ## Dependencies
//!
//! A [`Dependency`] is a notification hub. Every reactive slot owns one, and
//! every observed container owns one more for its shape. Reading a slot
//! while a watcher evaluates subscribes that watcher; writing a different
//! value notifies every subscriber.
//!
//! ## Containers
//!
//! [`Record`] and [`List`] hold plain data. Once observed, record fields
//! become reactive slots and list mutations go through a notifying surface.
//! A [`Signal`] is a single reactive slot on its own.
//!
//! ## Watchers
//!
//! A [`Watcher`] is a getter plus the dependencies it read last time, plus a
//! reaction policy: run synchronously, queue for the next flush, or mark a
//! cached value dirty. [`Memo`], [`Effect`], [`watch`] and [`Scope`] are
//! thin facades over it.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded. Handles are `Rc`-based and the
//! tracking context, observation toggle, host and config are thread-local.
//! Dependencies hold watchers weakly; whoever created a watcher owns it.

mod context;
mod dependency;
mod effect;
mod list;
mod memo;
mod observer;
mod record;
mod runtime;
mod scope;
mod signal;
mod traverse;
mod watch;
mod watcher;

pub use context::ReactiveContext;
pub use dependency::{DepId, Dependency};
pub use effect::Effect;
pub use list::List;
pub use memo::{Memo, Setter};
pub use observer::{
    define_reactive, is_observing, observe, without_observation, ObservationGuard, Observer,
    ReactiveOptions,
};
pub use record::Record;
pub use runtime::Runtime;
pub use scope::{Hook, Scope};
pub use signal::Signal;
pub use watch::{watch, watch_path, WatchOptions};
pub use watcher::{
    BeforeHook, Callback, Getter, ReactionPolicy, Watcher, WatcherId, WatcherOptions, WatcherOwner,
};
