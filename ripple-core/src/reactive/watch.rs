//! Explicit watches.
//!
//! [`watch`] registers a user watcher: a getter plus a callback invoked with
//! `(new, old)` whenever the getter's result changes. Errors from either are
//! reported to the host and never propagate, so one failing watch cannot
//! stall the flush it runs in.
//!
//! [`watch_path`] is the common special case of watching a dotted path such
//! as `"user.address.city"` into a record. Numeric segments index lists.
//!
//! The watch stays registered as long as the returned [`Watcher`] is alive
//! and has not been torn down.

use std::rc::{Rc, Weak};

use super::context::ReactiveContext;
use super::record::Record;
use super::runtime::Runtime;
use super::watcher::{Callback, Getter, Watcher, WatcherOptions, WatcherOwner};
use crate::error::{ReactiveError, Result};
use crate::value::Value;

/// Options for [`watch`] and [`watch_path`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Track every member reachable from the watched value.
    pub deep: bool,
    /// Invoke the callback once right away with `(value, Null)`.
    pub immediate: bool,
    /// React inside the notifying write instead of in the next flush.
    pub sync: bool,
}

/// Watch the result of `getter`, calling `callback(new, old)` when it
/// changes.
pub fn watch<G, C>(getter: G, callback: C, options: WatchOptions) -> Result<Watcher>
where
    G: Fn() -> Result<Value> + 'static,
    C: Fn(&Value, &Value) -> Result<()> + 'static,
{
    watch_with_owner(Rc::new(getter), Rc::new(callback), options, None, None)
}

/// Watch a dotted path into `record`.
///
/// Fails with [`ReactiveError::InvalidPath`] if the path contains anything
/// but word characters, `.` and `$`, or has an empty segment.
pub fn watch_path<C>(record: &Record, path: &str, callback: C, options: WatchOptions) -> Result<Watcher>
where
    C: Fn(&Value, &Value) -> Result<()> + 'static,
{
    let getter = path_getter(record, path)?;
    watch_with_owner(
        getter,
        Rc::new(callback),
        options,
        Some(format!("watch \"{path}\"")),
        None,
    )
}

pub(crate) fn watch_with_owner(
    getter: Getter,
    callback: Callback,
    options: WatchOptions,
    label: Option<String>,
    owner: Option<Weak<dyn WatcherOwner>>,
) -> Result<Watcher> {
    let watcher = Watcher::new(
        move || getter(),
        Some(callback.clone()),
        WatcherOptions {
            deep: options.deep,
            user: true,
            sync: options.sync,
            label,
            owner,
            ..WatcherOptions::default()
        },
    )?;

    if options.immediate {
        let value = watcher.value();
        if let Err(err) = ReactiveContext::untracked(|| callback(&value, &Value::Null)) {
            Runtime::report_error(
                &err,
                &format!("callback for immediate watcher \"{}\"", watcher.label()),
            );
        }
    }
    Ok(watcher)
}

/// Build a getter that resolves `path` against `record` on every call.
pub(crate) fn path_getter(record: &Record, path: &str) -> Result<Getter> {
    let segments = parse_path(path)?;
    let root = record.clone();
    Ok(Rc::new(move || Ok(resolve(&root, &segments))))
}

fn parse_path(path: &str) -> Result<Vec<String>> {
    let valid_chars = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '$');
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if !valid_chars || segments.iter().any(String::is_empty) {
        return Err(ReactiveError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn resolve(root: &Record, segments: &[String]) -> Value {
    let mut current = Value::Record(root.clone());
    for segment in segments {
        current = match &current {
            Value::Record(record) => record.get(segment).unwrap_or_default(),
            Value::List(list) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| list.get(index))
                .unwrap_or_default(),
            _ => return Value::Null,
        };
    }
    current
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{List, Signal};
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<(Value, Value)>>>;

    fn logger() -> (Log, impl Fn(&Value, &Value) -> Result<()>) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |new: &Value, old: &Value| {
            sink.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        })
    }

    fn sync() -> WatchOptions {
        WatchOptions {
            sync: true,
            ..WatchOptions::default()
        }
    }

    #[test]
    fn paths_are_validated() {
        assert!(parse_path("a.b.c").is_ok());
        assert!(parse_path("$data._x.0").is_ok());
        for bad in ["", "a..b", "a.", "a[0]", "a b", "a-b"] {
            assert_eq!(parse_path(bad), Err(ReactiveError::InvalidPath(bad.to_string())));
        }
    }

    #[test]
    fn watch_path_follows_nested_records_and_lists() {
        let items: List = [Record::new().with("name", "first")].into_iter().collect();
        let root = Record::new().with("items", items.clone());
        root.observe(false);

        let (log, callback) = logger();
        let watcher = watch_path(&root, "items.0.name", callback, sync()).unwrap();
        assert_eq!(watcher.value(), Value::from("first"));

        items.unshift(Record::new().with("name", "zeroth")).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![(Value::from("zeroth"), Value::from("first"))]
        );
    }

    #[test]
    fn missing_segments_resolve_to_null() {
        let root = Record::new().with("a", 1);
        root.observe(false);
        let (_log, callback) = logger();
        let watcher = watch_path(&root, "a.b.c", callback, sync()).unwrap();
        assert_eq!(watcher.value(), Value::Null);
    }

    #[test]
    fn immediate_invokes_callback_with_null_old_value() {
        let signal = Signal::new("x");
        let source = signal.clone();
        let (log, callback) = logger();
        let _watcher = watch(
            move || Ok(source.get()),
            callback,
            WatchOptions {
                immediate: true,
                ..WatchOptions::default()
            },
        )
        .unwrap();

        assert_eq!(*log.borrow(), vec![(Value::from("x"), Value::Null)]);
    }

    #[test]
    fn callback_errors_are_contained() {
        let signal = Signal::new(0);
        let source = signal.clone();
        let watcher = watch(
            move || Ok(source.get()),
            |_, _| Err(ReactiveError::computation("callback failed")),
            sync(),
        )
        .unwrap();

        signal.set(1).unwrap();
        assert!(watcher.is_active());
        assert_eq!(watcher.value(), Value::from(1));
    }
}
