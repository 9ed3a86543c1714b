//! Structural diff between record snapshots.
//!
//! Pure functions, no I/O, no engine state. Given two snapshots of a
//! record, [`diff_snapshots`] produces the ordered list of field-level
//! patches between them; [`equivalent`] is the equality relation the
//! diff is built on.
//!
//! # Equality rules
//!
//! - Primitives compare by value, dates by instant.
//! - Lists compare by length and pairwise equivalence — except lists
//!   whose items all carry an identity key (`id`/`uuid`), which compare
//!   the *sets* of ids, order-insensitively. List UIs reorder rows; a
//!   reorder alone is not a change worth persisting.
//! - Maps compare per key over the union of both keysets, so key
//!   insertion order never affects which paths differ.
//!
//! # Emission rules
//!
//! One patch per differing leaf, list, or date. Recursion descends only
//! through nested maps on both sides; any other difference emits a
//! single patch carrying the whole value at that path.

use draftsync_types::{Patch, Snapshot, Value};
use std::collections::BTreeSet;

/// Deep structural equivalence between two values.
#[must_use]
pub fn equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::List(xs), Value::List(ys)) => lists_equivalent(xs, ys),
        (Value::Map(xs), Value::Map(ys)) => {
            // A missing key and an explicit Null are the same state;
            // removals are persisted as Null writes.
            let keys: BTreeSet<&String> = xs.keys().chain(ys.keys()).collect();
            keys.into_iter().all(|key| {
                let x = xs.get(key).unwrap_or(&Value::Null);
                let y = ys.get(key).unwrap_or(&Value::Null);
                equivalent(x, y)
            })
        }
        _ => false,
    }
}

/// Computes the patches that turn `prev` into `next`.
///
/// Returns an empty list when the values are equivalent. `base_path`
/// is the dotted path of the value being compared; patches on nested
/// fields extend it.
#[must_use]
pub fn diff(prev: &Value, next: &Value, base_path: &str) -> Vec<Patch> {
    let mut patches = Vec::new();
    diff_into(prev, next, base_path, &mut patches);
    patches
}

/// Computes the patches between two whole-record snapshots.
///
/// Fields missing on one side are treated as [`Value::Null`].
#[must_use]
pub fn diff_snapshots(prev: &Snapshot, next: &Snapshot) -> Vec<Patch> {
    let mut patches = Vec::new();
    let fields: BTreeSet<&String> = prev
        .fields()
        .map(|(k, _)| k)
        .chain(next.fields().map(|(k, _)| k))
        .collect();

    for field in fields {
        let prev_value = prev.get(field).unwrap_or(&Value::Null);
        let next_value = next.get(field).unwrap_or(&Value::Null);
        diff_into(prev_value, next_value, field, &mut patches);
    }
    patches
}

fn diff_into(prev: &Value, next: &Value, base_path: &str, out: &mut Vec<Patch>) {
    if equivalent(prev, next) {
        return;
    }

    match (prev, next) {
        (Value::Map(prev_map), Value::Map(next_map)) => {
            let keys: BTreeSet<&String> = prev_map.keys().chain(next_map.keys()).collect();
            for key in keys {
                let child_prev = prev_map.get(key).unwrap_or(&Value::Null);
                let child_next = next_map.get(key).unwrap_or(&Value::Null);
                let child_path = join_path(base_path, key);
                diff_into(child_prev, child_next, &child_path, out);
            }
        }
        _ => {
            out.push(Patch::new(base_path, prev.clone(), next.clone()));
        }
    }
}

fn lists_equivalent(xs: &[Value], ys: &[Value]) -> bool {
    if let (Some(x_ids), Some(y_ids)) = (id_set(xs), id_set(ys)) {
        return x_ids == y_ids;
    }
    xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| equivalent(x, y))
}

/// The set of item ids, when every item in the list carries one.
fn id_set(items: &[Value]) -> Option<BTreeSet<String>> {
    if items.is_empty() {
        return Some(BTreeSet::new());
    }
    items.iter().map(Value::item_id).collect()
}

fn join_path(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}.{key}")
    }
}
