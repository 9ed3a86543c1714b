//! The record value tree.
//!
//! A record is a tree of field values: scalar leaves, dates, lists of
//! (usually identity-bearing) items, and nested maps. Values are owned
//! and cheap to clone at the granularity the engines need — one field
//! at a time, never whole documents in a hot loop.
//!
//! Maps use `BTreeMap` so key iteration order is deterministic and
//! independent of insertion order. The diff algorithm relies on this.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A payload handed to the transport: field path → value.
///
/// Keys are dotted paths; top-level field names in the common case.
/// Merging a newer payload into an older one is per-path
/// last-write-wins.
pub type Payload = BTreeMap<String, Value>;

/// A single field value in a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent / explicitly null.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// Text scalar.
    Text(String),
    /// A point in time. Compared by instant, not representation.
    Date(DateTime<Utc>),
    /// An ordered list of values, typically identity-bearing items.
    List(Vec<Value>),
    /// A nested keyed container.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true if this value is a plain keyed container.
    #[must_use]
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// Returns the nested map, if this value is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the list items, if this value is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the identity key of a list item, if it carries one.
    ///
    /// An item is identity-bearing when it is a map with an `id` (or
    /// `uuid`) field holding a text or integer value.
    #[must_use]
    pub fn item_id(&self) -> Option<String> {
        let map = self.as_map()?;
        let id = map.get("id").or_else(|| map.get("uuid"))?;
        match id {
            Value::Text(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// One observed state of the whole record: top-level field → value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, Value>);

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from `(field, value)` pairs.
    pub fn from_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    /// Returns the number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the snapshot has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over top-level `(field, value)` pairs in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns a top-level field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets a top-level field value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Removes a top-level field, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Resolves a dotted path through nested maps.
    ///
    /// Returns `None` when any intermediate segment is missing or not
    /// a map.
    #[must_use]
    pub fn value_at(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Writes a value at a dotted path, creating intermediate maps.
    ///
    /// An intermediate segment holding a non-map value is replaced by
    /// a map; the write always lands.
    pub fn set_value_at(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        set_in_map(&mut self.0, &segments, value);
    }

    /// Merges a single top-level field into the snapshot.
    pub fn merge_field(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Consumes the snapshot, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for Snapshot {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Returns the top-level segment of a dotted field path.
#[must_use]
pub fn root_field(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

fn set_in_map(map: &mut BTreeMap<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            map.insert((*leaf).to_string(), value);
        }
        [head, rest @ ..] => {
            let child = map
                .entry((*head).to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if !child.is_map() {
                *child = Value::Map(BTreeMap::new());
            }
            if let Value::Map(inner) = child {
                set_in_map(inner, rest, value);
            }
        }
    }
}
