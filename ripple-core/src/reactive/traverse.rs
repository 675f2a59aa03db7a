//! Deep traversal for deep watchers.
//!
//! Walks a value and re-reads every reachable member so the watcher being
//! evaluated subscribes to all of them. Observed containers are visited once
//! per traversal, keyed by their shape dependency id, which keeps cyclic
//! structures finite. Frozen and raw containers are skipped.

use std::collections::HashSet;

use super::dependency::DepId;
use crate::value::Value;

#[derive(Default)]
struct Seen {
    deps: HashSet<DepId>,
    /// Unobserved containers have no dependency; key them by address.
    plain: HashSet<usize>,
}

pub(crate) fn traverse(value: &Value) {
    walk(value, &mut Seen::default());
}

fn walk(value: &Value, seen: &mut Seen) {
    if !value.is_container() || value.is_frozen() || value.is_raw() {
        return;
    }
    let first_visit = match value.observer() {
        Some(observer) => seen.deps.insert(observer.dependency().id()),
        None => seen.plain.insert(address(value)),
    };
    if !first_visit {
        return;
    }

    match value {
        Value::Record(record) => {
            for key in record.keys() {
                if let Some(member) = record.get(&key) {
                    walk(&member, seen);
                }
            }
        }
        Value::List(list) => {
            for item in list.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}

fn address(value: &Value) -> usize {
    match value {
        Value::Record(record) => record.address(),
        Value::List(list) => list.address(),
        _ => 0,
    }
}
