//! Bound data source abstraction.
//!
//! The record's field values, dirty tracking, and validation live in
//! the embedding application (a form binding, a document model). The
//! core consumes them through these traits and never owns the values.

use crate::error::AutosaveResult;
use async_trait::async_trait;
use draftsync_types::{EditOrigin, Snapshot, Value};
use std::collections::BTreeSet;

/// Field-granular read/write access to the bound record.
///
/// `write_field` is expected to make the data source reflect the new
/// value and mark the field as edited. The origin marker tells the
/// source (and anything observing it) whether the write is a new user
/// edit or a replay.
pub trait FieldAccess: Send + Sync {
    /// Reads the current value at a dotted path.
    fn read_field(&self, path: &str) -> Option<Value>;

    /// Writes a value at a dotted path.
    fn write_field(&self, path: &str, value: &Value, origin: EditOrigin);
}

/// Everything the core needs from the bound data source.
#[async_trait]
pub trait RecordSource: FieldAccess {
    /// Reads all current field values as one snapshot.
    fn snapshot(&self) -> Snapshot;

    /// The top-level fields currently marked as edited.
    fn dirty_fields(&self) -> BTreeSet<String>;

    /// Validates the named fields; `false` means the payload must not
    /// be persisted.
    async fn validate(&self, fields: &[String]) -> AutosaveResult<bool>;
}

/// An in-memory record source for testing.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// One observed field write.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedWrite {
        /// The dotted path written.
        pub path: String,
        /// The value written.
        pub value: Value,
        /// The origin marker on the write.
        pub origin: EditOrigin,
    }

    /// A mock data source holding a snapshot in memory.
    ///
    /// Writes update the snapshot and mark the root field dirty, as a
    /// real binding would; every write is also recorded for
    /// assertions.
    #[derive(Debug, Default)]
    pub struct MockSource {
        state: Mutex<MockState>,
    }

    #[derive(Debug, Default)]
    struct MockState {
        snapshot: Snapshot,
        dirty: BTreeSet<String>,
        writes: Vec<RecordedWrite>,
        validate_verdict: bool,
        validate_calls: usize,
    }

    impl MockSource {
        /// Creates an empty source that validates everything.
        #[must_use]
        pub fn new() -> Self {
            let source = Self::default();
            source.state.lock().unwrap().validate_verdict = true;
            source
        }

        /// Creates a source seeded with a snapshot.
        #[must_use]
        pub fn with_snapshot(snapshot: Snapshot) -> Self {
            let source = Self::new();
            source.state.lock().unwrap().snapshot = snapshot;
            source
        }

        /// Sets a field as a user edit would (value + dirty mark).
        pub fn edit(&self, path: &str, value: Value) {
            let mut state = self.state.lock().unwrap();
            state.snapshot.set_value_at(path, value);
            state
                .dirty
                .insert(draftsync_types::root_field(path).to_string());
        }

        /// Clears all dirty marks, as a binding does after a reset.
        pub fn mark_clean(&self) {
            self.state.lock().unwrap().dirty.clear();
        }

        /// Scripts the verdict future `validate` calls return.
        pub fn set_validate_verdict(&self, verdict: bool) {
            self.state.lock().unwrap().validate_verdict = verdict;
        }

        /// Number of times `validate` actually ran.
        #[must_use]
        pub fn validate_calls(&self) -> usize {
            self.state.lock().unwrap().validate_calls
        }

        /// The writes observed so far.
        #[must_use]
        pub fn writes(&self) -> Vec<RecordedWrite> {
            self.state.lock().unwrap().writes.clone()
        }
    }

    impl FieldAccess for MockSource {
        fn read_field(&self, path: &str) -> Option<Value> {
            self.state.lock().unwrap().snapshot.value_at(path).cloned()
        }

        fn write_field(&self, path: &str, value: &Value, origin: EditOrigin) {
            let mut state = self.state.lock().unwrap();
            state.snapshot.set_value_at(path, value.clone());
            state
                .dirty
                .insert(draftsync_types::root_field(path).to_string());
            state.writes.push(RecordedWrite {
                path: path.to_string(),
                value: value.clone(),
                origin,
            });
        }
    }

    #[async_trait]
    impl RecordSource for MockSource {
        fn snapshot(&self) -> Snapshot {
            self.state.lock().unwrap().snapshot.clone()
        }

        fn dirty_fields(&self) -> BTreeSet<String> {
            self.state.lock().unwrap().dirty.clone()
        }

        async fn validate(&self, _fields: &[String]) -> AutosaveResult<bool> {
            let mut state = self.state.lock().unwrap();
            state.validate_calls += 1;
            Ok(state.validate_verdict)
        }
    }
}
