//! Patches and history entries.
//!
//! A patch is one field-path-scoped before/after value pair; a history
//! entry is the ordered, non-empty group of patches produced by a
//! single atomic edit. Both are immutable once created — undo and redo
//! build fresh inverse entries rather than mutating stored ones.

use crate::value::{root_field, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single field-level change: the value before and after one edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Dotted field path the change applies to.
    pub path: String,
    /// The value before the edit.
    pub prev: Value,
    /// The value after the edit.
    pub next: Value,
    /// The top-level segment of `path`, for field-granular dirty
    /// tracking.
    pub root_field: String,
}

impl Patch {
    /// Creates a patch, deriving `root_field` from the path.
    #[must_use]
    pub fn new(path: impl Into<String>, prev: Value, next: Value) -> Self {
        let path = path.into();
        let root = root_field(&path).to_string();
        Self {
            path,
            prev,
            next,
            root_field: root,
        }
    }

    /// Returns the patch with `prev` and `next` swapped.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            path: self.path.clone(),
            prev: self.next.clone(),
            next: self.prev.clone(),
            root_field: self.root_field.clone(),
        }
    }
}

/// The patches produced by one atomic edit, in emission order.
///
/// Never empty: construction rejects an empty patch list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    patches: Vec<Patch>,
}

impl HistoryEntry {
    /// Wraps a patch list, or returns `None` when it is empty.
    #[must_use]
    pub fn new(patches: Vec<Patch>) -> Option<Self> {
        if patches.is_empty() {
            None
        } else {
            Some(Self { patches })
        }
    }

    /// The patches in this entry.
    #[must_use]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Number of patches in this entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Always false; kept for the conventional pairing with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// The distinct top-level fields this entry touches.
    #[must_use]
    pub fn root_fields(&self) -> BTreeSet<&str> {
        self.patches
            .iter()
            .map(|p| p.root_field.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_derives_root_field() {
        let patch = Patch::new("profile.name", Value::Null, Value::from("Ada"));
        assert_eq!(patch.root_field, "profile");
    }

    #[test]
    fn inverted_swaps_values() {
        let patch = Patch::new("title", Value::from("a"), Value::from("b"));
        let inverse = patch.inverted();
        assert_eq!(inverse.prev, Value::from("b"));
        assert_eq!(inverse.next, Value::from("a"));
        assert_eq!(inverse.path, "title");
    }

    #[test]
    fn entry_rejects_empty_patch_list() {
        assert!(HistoryEntry::new(Vec::new()).is_none());
    }

    #[test]
    fn root_fields_deduplicate() {
        let entry = HistoryEntry::new(vec![
            Patch::new("profile.name", Value::Null, Value::from("a")),
            Patch::new("profile.bio", Value::Null, Value::from("b")),
            Patch::new("title", Value::Null, Value::from("c")),
        ])
        .unwrap();

        let roots: Vec<&str> = entry.root_fields().into_iter().collect();
        assert_eq!(roots, vec!["profile", "title"]);
    }
}
