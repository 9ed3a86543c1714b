//! The history engine.
//!
//! Past/future stacks of patch groups with save-point checkpoints.
//! Undo and redo apply values through the injected field accessor in
//! replay mode, so the surrounding recorder can tell a replay from a
//! new user edit.
//!
//! The engine never clears the future stack on its own: the caller
//! invalidates redo explicitly, exactly when a user-originated entry
//! is about to be recorded while redo is possible. Programmatic
//! replays must not invalidate.

use crate::source::FieldAccess;
use draftsync_types::{EditOrigin, HistoryEntry, Patch, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::debug;

/// Observable undo/redo affordances, published on every mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStatus {
    /// Whether an undo is available.
    pub can_undo: bool,
    /// Whether a redo is available.
    pub can_redo: bool,
    /// Current depth of the past stack.
    pub depth: usize,
}

/// Capacity-bounded undo/redo stacks with checkpoint bookkeeping.
pub struct HistoryEngine {
    fields: Arc<dyn FieldAccess>,
    capacity: usize,
    state: RwLock<HistoryState>,
    status_tx: watch::Sender<HistoryStatus>,
}

#[derive(Default)]
struct HistoryState {
    past: VecDeque<HistoryEntry>,
    future: Vec<HistoryEntry>,
    /// Indices into `past` depth at the moment of each confirmed save,
    /// kept sorted non-decreasing.
    checkpoints: Vec<usize>,
}

impl HistoryEngine {
    /// Creates an engine writing through the given field accessor.
    pub fn new(fields: Arc<dyn FieldAccess>, capacity: usize) -> Self {
        let (status_tx, _) = watch::channel(HistoryStatus::default());
        Self {
            fields,
            capacity,
            state: RwLock::new(HistoryState::default()),
            status_tx,
        }
    }

    /// Appends an entry to the past stack, evicting the oldest entry
    /// when over capacity. Entries are non-empty by construction.
    pub async fn record(&self, entry: HistoryEntry) {
        let mut state = self.state.write().await;
        Self::push_past(&mut state, entry, self.capacity);
        self.publish(&state);
    }

    /// Clears the future stack. Callers invoke this exactly when a
    /// user-originated edit is recorded while redo is possible.
    pub async fn invalidate_redo(&self) {
        let mut state = self.state.write().await;
        if !state.future.is_empty() {
            debug!(invalidated = state.future.len(), "redo lineage invalidated");
            state.future.clear();
            self.publish(&state);
        }
    }

    /// Undoes the most recent entry. Returns false when there is
    /// nothing to undo.
    pub async fn undo(&self) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.past.pop_back() else {
            return false;
        };

        // The inverse captures what is live *now* as the value redo
        // restores, in case unrelated edits landed since this entry
        // was recorded.
        let inverse: Vec<Patch> = entry
            .patches()
            .iter()
            .map(|p| {
                let live = self.fields.read_field(&p.path).unwrap_or(Value::Null);
                Patch::new(p.path.clone(), p.prev.clone(), live)
            })
            .collect();
        if let Some(inverse) = HistoryEntry::new(inverse) {
            state.future.push(inverse);
        }

        for patch in entry.patches() {
            self.fields
                .write_field(&patch.path, &patch.prev, EditOrigin::Undo);
        }

        self.publish(&state);
        true
    }

    /// Redoes the most recently undone entry. Returns false when there
    /// is nothing to redo.
    pub async fn redo(&self) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.future.pop() else {
            return false;
        };

        let inverse: Vec<Patch> = entry
            .patches()
            .iter()
            .map(|p| {
                let live = self.fields.read_field(&p.path).unwrap_or(Value::Null);
                Patch::new(p.path.clone(), live, p.next.clone())
            })
            .collect();
        if let Some(inverse) = HistoryEntry::new(inverse) {
            Self::push_past(&mut state, inverse, self.capacity);
        }

        for patch in entry.patches() {
            self.fields
                .write_field(&patch.path, &patch.next, EditOrigin::Redo);
        }

        self.publish(&state);
        true
    }

    /// Records the current depth as a checkpoint. Called exactly once
    /// per confirmed successful save.
    pub async fn mark_checkpoint(&self) {
        let mut state = self.state.write().await;
        let depth = state.past.len();
        // Checkpoints beyond the current depth refer to history that
        // has since been undone; they can never be restored to again.
        while state.checkpoints.last().is_some_and(|&c| c > depth) {
            state.checkpoints.pop();
        }
        if state.checkpoints.last() != Some(&depth) {
            state.checkpoints.push(depth);
            debug!(depth, "checkpoint marked");
        }
    }

    /// Undoes down to the most recent checkpoint, or all the way to
    /// empty when none exists. Returns the number of entries undone.
    pub async fn undo_to_last_checkpoint(&self) -> usize {
        let target = {
            let mut state = self.state.write().await;
            let depth = state.past.len();
            while state.checkpoints.last().is_some_and(|&c| c > depth) {
                state.checkpoints.pop();
            }
            state.checkpoints.pop().unwrap_or(0)
        };

        let mut undone = 0;
        loop {
            {
                let state = self.state.read().await;
                if state.past.len() <= target {
                    break;
                }
            }
            if !self.undo().await {
                break;
            }
            undone += 1;
        }
        undone
    }

    /// Whether an undo is available.
    pub async fn can_undo(&self) -> bool {
        !self.state.read().await.past.is_empty()
    }

    /// Whether a redo is available.
    pub async fn can_redo(&self) -> bool {
        !self.state.read().await.future.is_empty()
    }

    /// Empties both stacks and all checkpoints. Used on full
    /// hydration or reset.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.past.clear();
        state.future.clear();
        state.checkpoints.clear();
        self.publish(&state);
    }

    /// Subscribes to undo/redo affordance changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HistoryStatus> {
        self.status_tx.subscribe()
    }

    fn push_past(state: &mut HistoryState, entry: HistoryEntry, capacity: usize) {
        state.past.push_back(entry);
        if state.past.len() > capacity {
            state.past.pop_front();
            // Shift checkpoints down with the evicted entry; a
            // checkpoint that falls below zero is unreachable.
            state.checkpoints = state
                .checkpoints
                .iter()
                .filter_map(|&c| c.checked_sub(1))
                .collect();
        }
    }

    fn publish(&self, state: &HistoryState) {
        self.status_tx.send_replace(HistoryStatus {
            can_undo: !state.past.is_empty(),
            can_redo: !state.future.is_empty(),
            depth: state.past.len(),
        });
    }
}
