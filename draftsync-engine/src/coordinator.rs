//! The autosave coordinator.
//!
//! Ties the engines to the bound data source: observed edits become
//! diffs, diffs become history entries and queued payloads, undo/redo
//! replay through the history engine under the right origin marker,
//! and hydration replaces everything with server state.
//!
//! The embedding application drives it: call [`Autosaver::observe`]
//! after user edits settle into the data source, [`Autosaver::undo`] /
//! [`Autosaver::redo`] from the corresponding affordances, and
//! [`Autosaver::flush`] for an explicit save-now.

use crate::config::AutosaveConfig;
use crate::error::AutosaveResult;
use crate::history::{HistoryEngine, HistoryStatus};
use crate::metrics::{MetricsSnapshot, SaveMetrics};
use crate::pipeline::SavePipeline;
use crate::queue::{QueueStatus, SaveQueue};
use crate::reconcile::{DiffHandler, ReconcileEngine};
use crate::source::RecordSource;
use crate::transport::SaveTransport;
use draftsync_diff::diff_snapshots;
use draftsync_types::{EditOrigin, HistoryEntry, Payload, SaveOutcome, Snapshot, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

/// The autosave coordination facade.
pub struct Autosaver {
    source: Arc<dyn RecordSource>,
    queue: SaveQueue,
    history: Arc<HistoryEngine>,
    reconcile: Arc<ReconcileEngine>,
    config: AutosaveConfig,
    metrics: Arc<SaveMetrics>,
    /// The snapshot the last recorded diff was taken against.
    observed: Mutex<Option<Snapshot>>,
    /// Set while undo/redo/hydration writes are landing, so a
    /// re-entrant observe refreshes state without recording.
    replaying: AtomicBool,
}

impl Autosaver {
    /// Builds an autosaver over a data source and a transport.
    pub fn new<S>(
        source: Arc<S>,
        transport: Arc<dyn SaveTransport>,
        config: AutosaveConfig,
    ) -> AutosaveResult<Self>
    where
        S: RecordSource + 'static,
    {
        config.validate()?;

        let metrics = Arc::new(SaveMetrics::new(config.enable_metrics));
        let reconcile = Arc::new(ReconcileEngine::new());
        let history = Arc::new(HistoryEngine::new(
            source.clone(),
            config.history_capacity,
        ));
        let pipeline = Arc::new(SavePipeline::new(
            transport,
            source.clone(),
            reconcile.clone(),
            history.clone(),
            &config,
            metrics.clone(),
        ));
        let queue = SaveQueue::new(pipeline, &config, metrics.clone());

        Ok(Self {
            source,
            queue,
            history,
            reconcile,
            config,
            metrics,
            observed: Mutex::new(None),
            replaying: AtomicBool::new(false),
        })
    }

    /// Registers a list-field reconciliation handler.
    pub async fn register_diff_handler(&self, field: impl Into<String>, handler: DiffHandler) {
        self.reconcile.register_handler(field, handler).await;
    }

    // ── Edit intake ──────────────────────────────────────────────

    /// Observes the data source's current state, records the diff
    /// against the previous observation as one atomic edit, and
    /// queues the changed fields.
    ///
    /// The first observation only establishes the reference snapshot
    /// (and adopts the baseline when the source is clean). During a
    /// replay, observation refreshes the reference without recording.
    pub async fn observe(&self) -> AutosaveResult<SaveOutcome> {
        let current = self.source.snapshot();

        let mut observed = self.observed.lock().await;
        let previous = observed.replace(current.clone());

        if self.source.dirty_fields().is_empty() {
            self.reconcile.adopt_if_absent(&current).await;
        }

        if self.replaying.load(Ordering::SeqCst) {
            return Ok(SaveOutcome::NothingToSave);
        }

        let Some(previous) = previous else {
            return Ok(SaveOutcome::NothingToSave);
        };
        let patches = diff_snapshots(&previous, &current);
        let Some(entry) = HistoryEntry::new(patches) else {
            return Ok(SaveOutcome::NothingToSave);
        };

        // A new user edit after undos invalidates the redo lineage;
        // the history engine never does this on its own.
        if self.history.can_redo().await {
            self.history.invalidate_redo().await;
        }

        let mut delta = Payload::new();
        for field in entry.root_fields() {
            let value = current.get(field).cloned().unwrap_or(Value::Null);
            delta.insert(field.to_string(), value);
        }
        self.history.record(entry).await;
        drop(observed);

        self.queue.queue_change(delta).await
    }

    // ── Time travel ──────────────────────────────────────────────

    /// Undoes the most recent edit and, per config, queues the
    /// resulting baseline delta.
    pub async fn undo(&self) -> AutosaveResult<SaveOutcome> {
        self.replaying.store(true, Ordering::SeqCst);
        let undone = self.history.undo().await;
        self.refresh_observed().await;
        self.replaying.store(false, Ordering::SeqCst);

        if !undone {
            return Ok(SaveOutcome::NothingToSave);
        }
        self.queue_baseline_delta().await
    }

    /// Redoes the most recently undone edit and, per config, queues
    /// the resulting baseline delta.
    pub async fn redo(&self) -> AutosaveResult<SaveOutcome> {
        self.replaying.store(true, Ordering::SeqCst);
        let redone = self.history.redo().await;
        self.refresh_observed().await;
        self.replaying.store(false, Ordering::SeqCst);

        if !redone {
            return Ok(SaveOutcome::NothingToSave);
        }
        self.queue_baseline_delta().await
    }

    /// Undoes every edit after the most recent confirmed save (or
    /// everything, with no checkpoint), then queues the delta.
    pub async fn undo_to_last_checkpoint(&self) -> AutosaveResult<SaveOutcome> {
        self.replaying.store(true, Ordering::SeqCst);
        let undone = self.history.undo_to_last_checkpoint().await;
        self.refresh_observed().await;
        self.replaying.store(false, Ordering::SeqCst);

        if undone == 0 {
            return Ok(SaveOutcome::NothingToSave);
        }
        info!(undone, "restored to last checkpoint");
        self.queue_baseline_delta().await
    }

    // ── Save control ─────────────────────────────────────────────

    /// Saves now: cancels the debounce timer and flushes pending
    /// changes. Also the retry affordance after a failure.
    pub async fn flush(&self) -> AutosaveResult<SaveOutcome> {
        self.queue.flush().await
    }

    /// Discards pending changes and cancels any inflight attempt.
    pub async fn abort(&self) {
        self.queue.abort().await;
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Replaces the record with server state: writes every field with
    /// the hydration origin, clears history and pending saves, and
    /// re-baselines to the hydrated snapshot.
    pub async fn hydrate(&self, snapshot: Snapshot) {
        self.replaying.store(true, Ordering::SeqCst);
        self.reconcile.set_hydrating(true).await;

        self.queue.abort().await;
        for (field, value) in snapshot.fields() {
            self.source.write_field(field, value, EditOrigin::Hydration);
        }
        self.history.clear().await;
        self.reconcile.force_baseline(snapshot).await;
        self.refresh_observed().await;

        self.reconcile.set_hydrating(false).await;
        self.replaying.store(false, Ordering::SeqCst);
        info!("record hydrated from server state");
    }

    /// Handles a full data-source reset: with zero tracked dirty
    /// fields, drops history, pending saves, and the baseline.
    /// Suppressed while a hydration replay is in progress.
    pub async fn reset(&self) {
        if self.reconcile.is_hydrating().await {
            debug!("reset ignored during hydration");
            return;
        }
        if !self.source.dirty_fields().is_empty() {
            debug!("reset ignored, source still has dirty fields");
            return;
        }
        self.queue.abort().await;
        self.history.clear().await;
        self.reconcile.clear_baseline().await;
        *self.observed.lock().await = None;
    }

    // ── Observation surface ──────────────────────────────────────

    /// Subscribes to save-queue status (is-saving, last error,
    /// pending count).
    #[must_use]
    pub fn queue_status(&self) -> watch::Receiver<QueueStatus> {
        self.queue.status()
    }

    /// Subscribes to undo/redo affordance changes.
    #[must_use]
    pub fn history_status(&self) -> watch::Receiver<HistoryStatus> {
        self.history.subscribe()
    }

    /// Whether an undo is available.
    pub async fn can_undo(&self) -> bool {
        self.history.can_undo().await
    }

    /// Whether a redo is available.
    pub async fn can_redo(&self) -> bool {
        self.history.can_redo().await
    }

    /// The current baseline snapshot, if one is established.
    pub async fn baseline(&self) -> Option<Snapshot> {
        self.reconcile.baseline().await
    }

    /// A point-in-time copy of the save metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn refresh_observed(&self) {
        *self.observed.lock().await = Some(self.source.snapshot());
    }

    /// Queues the fields whose current value differs from the
    /// baseline — the payload source after replays, where dirty
    /// tracking cannot be trusted. The delta *replaces* the pending
    /// payload: anything queued before the replay may carry values
    /// the replay just rewound.
    async fn queue_baseline_delta(&self) -> AutosaveResult<SaveOutcome> {
        let current = self.source.snapshot();
        let delta = self.reconcile.changed_since_baseline(&current).await;
        self.queue
            .replace_pending(delta, self.config.save_on_history_nav)
            .await
    }
}
