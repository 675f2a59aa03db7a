//! Ripple Core
//!
//! This crate provides a fine-grained reactive engine: state wrapped so that
//! reads are recorded as dependencies of whatever computation is running,
//! and writes re-run exactly the computations that read the changed data,
//! deduplicated and in creation order, on the next deferred turn.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamically typed [`Value`] the engine stores
//! - `reactive`: dependencies, observed containers, watchers and facades
//! - `scheduler`: the batched update queue and the host seam
//! - `config` / `error`: per-thread tunables and the crate error type
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{watch, Record, Runtime, WatchOptions};
//! use ripple_core::Value;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let state = Record::new().with("a", 1);
//! state.observe(false);
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let source = state.clone();
//! let _watcher = watch(
//!     move || Ok(source.get("a").unwrap_or_default()),
//!     move |new, old| {
//!         sink.borrow_mut().push((new.clone(), old.clone()));
//!         Ok(())
//!     },
//!     WatchOptions::default(),
//! )
//! .unwrap();
//!
//! state.set("a", 2).unwrap();
//! state.set("a", 3).unwrap();
//! Runtime::tick();
//!
//! assert_eq!(*seen.borrow(), vec![(Value::from(3), Value::from(1))]);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod value;

pub use config::Config;
pub use error::{ReactiveError, Result};
pub use value::Value;
