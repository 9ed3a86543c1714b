//! The reconciliation engine.
//!
//! Owns the baseline — the last snapshot known to be persisted — and
//! everything computed against it: minimal save payloads, and
//! identity-keyed add/remove reconciliation for list-valued fields
//! with registered handlers.
//!
//! Baseline policy: a field advances only on confirmed persistence.
//! For ordinary fields that is the main transport acknowledgement; for
//! handler-managed list fields it is the success of all of that
//! field's add/remove calls, which are the field's own persistence
//! acknowledgment. A field with any item failure never advances and is
//! reported for re-attention.

use crate::error::{AutosaveResult, ItemFailure, ItemOp};
use draftsync_diff::equivalent;
use draftsync_types::{Payload, Snapshot, Value};
use futures::future::{join_all, BoxFuture};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Callback turning a list item into its identity key.
pub type IdOf = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Async per-item side-effect callback.
pub type ItemCallback = Arc<dyn Fn(Value) -> BoxFuture<'static, AutosaveResult<()>> + Send + Sync>;

/// Per-field reconciliation descriptor for a list-valued field.
///
/// Items present in the candidate list but not in the baseline are
/// added; items present in the baseline but not in the candidate are
/// removed. Both sets are keyed by `id_of`.
#[derive(Clone)]
pub struct DiffHandler {
    id_of: IdOf,
    on_add: ItemCallback,
    on_remove: ItemCallback,
}

impl DiffHandler {
    /// Creates a handler with an explicit identity function.
    pub fn new(id_of: IdOf, on_add: ItemCallback, on_remove: ItemCallback) -> Self {
        Self {
            id_of,
            on_add,
            on_remove,
        }
    }

    /// Creates a handler keyed by the items' own `id`/`uuid` field.
    pub fn by_item_id(on_add: ItemCallback, on_remove: ItemCallback) -> Self {
        Self::new(Arc::new(Value::item_id), on_add, on_remove)
    }
}

/// The outcome of reconciling one list field.
#[derive(Debug, Clone)]
pub struct FieldOutcome {
    /// The reconciled field.
    pub field: String,
    /// Items added.
    pub added: usize,
    /// Items removed.
    pub removed: usize,
    /// Item-level failures; empty means the field fully succeeded.
    pub failures: Vec<ItemFailure>,
}

impl FieldOutcome {
    /// Whether every add/remove for this field succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Baseline tracking and list-field reconciliation.
pub struct ReconcileEngine {
    state: RwLock<ReconcileState>,
    handlers: RwLock<HashMap<String, DiffHandler>>,
}

#[derive(Default)]
struct ReconcileState {
    baseline: Option<Snapshot>,
    hydrating: bool,
}

impl Default for ReconcileEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcileEngine {
    /// Creates an engine with no baseline and no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ReconcileState::default()),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a reconciliation handler for a list-valued field.
    pub async fn register_handler(&self, field: impl Into<String>, handler: DiffHandler) {
        self.handlers.write().await.insert(field.into(), handler);
    }

    // ── Baseline lifecycle ───────────────────────────────────────

    /// Adopts the snapshot as baseline if none exists yet. Returns
    /// true when adopted.
    pub async fn adopt_if_absent(&self, snapshot: &Snapshot) -> bool {
        let mut state = self.state.write().await;
        if state.baseline.is_some() {
            return false;
        }
        debug!(fields = snapshot.len(), "baseline adopted");
        state.baseline = Some(snapshot.clone());
        true
    }

    /// Replaces the baseline wholesale (explicit re-baselining, e.g.
    /// right after hydration or a manual full save).
    pub async fn force_baseline(&self, snapshot: Snapshot) {
        self.state.write().await.baseline = Some(snapshot);
    }

    /// Clears the baseline, unless a hydration replay is in progress.
    pub async fn clear_baseline(&self) {
        let mut state = self.state.write().await;
        if state.hydrating {
            debug!("baseline clear suppressed during hydration");
            return;
        }
        state.baseline = None;
    }

    /// Marks the start/end of a hydration-from-server replay.
    pub async fn set_hydrating(&self, hydrating: bool) {
        self.state.write().await.hydrating = hydrating;
    }

    /// Whether a hydration replay is in progress.
    pub async fn is_hydrating(&self) -> bool {
        self.state.read().await.hydrating
    }

    /// A copy of the current baseline, if any.
    pub async fn baseline(&self) -> Option<Snapshot> {
        self.state.read().await.baseline.clone()
    }

    /// Merges the saved payload's keys into the baseline — never a
    /// wholesale replace, so untouched fields keep their confirmed
    /// values.
    pub async fn commit_saved(&self, payload: &Payload) {
        let mut state = self.state.write().await;
        let baseline = state.baseline.get_or_insert_with(Snapshot::new);
        for (path, value) in payload {
            baseline.set_value_at(path, value.clone());
        }
    }

    /// Advances the baseline for a single field.
    pub async fn commit_field(&self, field: &str, value: &Value) {
        let mut state = self.state.write().await;
        let baseline = state.baseline.get_or_insert_with(Snapshot::new);
        baseline.set_value_at(field, value.clone());
    }

    // ── Payload computation ──────────────────────────────────────

    /// The top-level fields whose current value differs from the
    /// baseline. This is the payload source after undo/redo replays,
    /// where dirty tracking cannot be trusted to reflect programmatic
    /// writes. With no baseline, every current field is changed.
    pub async fn changed_since_baseline(&self, current: &Snapshot) -> Payload {
        let state = self.state.read().await;
        let Some(baseline) = &state.baseline else {
            return current
                .fields()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        };

        let mut payload = Payload::new();
        let fields: std::collections::BTreeSet<&String> = baseline
            .fields()
            .map(|(k, _)| k)
            .chain(current.fields().map(|(k, _)| k))
            .collect();

        for field in fields {
            let base = baseline.get(field).unwrap_or(&Value::Null);
            let now = current.get(field).unwrap_or(&Value::Null);
            if !equivalent(base, now) {
                payload.insert(field.clone(), now.clone());
            }
        }
        payload
    }

    /// Drops payload entries whose value already matches the baseline
    /// at that path — they are persisted and need no save.
    pub async fn strip_unchanged(&self, payload: &mut Payload) {
        let state = self.state.read().await;
        let Some(baseline) = &state.baseline else {
            return;
        };
        payload.retain(|path, value| {
            let base = baseline.value_at(path).unwrap_or(&Value::Null);
            !equivalent(base, value)
        });
    }

    // ── List-field reconciliation ────────────────────────────────

    /// Reconciles every handler-managed field present in the payload.
    ///
    /// Each such field is removed from the payload — it is persisted
    /// through its own add/remove calls, not as a bulk field. Within a
    /// field, all item callbacks run concurrently and failures are
    /// collected, never fail-fast. A fully successful field advances
    /// its baseline immediately; a failed field does not.
    pub async fn reconcile_lists(&self, payload: &mut Payload) -> Vec<FieldOutcome> {
        let handlers = self.handlers.read().await;
        let mut outcomes = Vec::new();

        for (field, handler) in handlers.iter() {
            let Some(candidate) = payload.remove(field) else {
                continue;
            };
            let baseline_value = {
                let state = self.state.read().await;
                state
                    .baseline
                    .as_ref()
                    .and_then(|b| b.get(field))
                    .cloned()
            };

            let outcome =
                reconcile_field(field, handler, baseline_value.as_ref(), &candidate).await;

            if outcome.succeeded() {
                // The add/remove calls are this field's persistence
                // acknowledgment; it does not wait on the main
                // transport.
                self.commit_field(field, &candidate).await;
                debug!(
                    field,
                    added = outcome.added,
                    removed = outcome.removed,
                    "list field reconciled"
                );
            } else {
                warn!(
                    field,
                    failures = outcome.failures.len(),
                    "list field reconciliation failed, baseline withheld"
                );
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}

async fn reconcile_field(
    field: &str,
    handler: &DiffHandler,
    baseline: Option<&Value>,
    candidate: &Value,
) -> FieldOutcome {
    let empty = Vec::new();
    let base_items = baseline.and_then(Value::as_list).unwrap_or(&empty);
    let cand_items = candidate.as_list().unwrap_or(&empty);

    let base_keys = key_items(base_items, &handler.id_of);
    let cand_keys = key_items(cand_items, &handler.id_of);

    let mut ops: Vec<BoxFuture<'_, Option<ItemFailure>>> = Vec::new();

    for (key, item) in &cand_keys {
        if !base_keys.contains_key(key) {
            let fut = (handler.on_add)((*item).clone());
            let key = key.clone();
            ops.push(Box::pin(async move {
                fut.await.err().map(|error| ItemFailure {
                    field: field.to_string(),
                    op: ItemOp::Add,
                    item_key: key,
                    message: error.to_string(),
                })
            }));
        }
    }
    for (key, item) in &base_keys {
        if !cand_keys.contains_key(key) {
            let fut = (handler.on_remove)((*item).clone());
            let key = key.clone();
            ops.push(Box::pin(async move {
                fut.await.err().map(|error| ItemFailure {
                    field: field.to_string(),
                    op: ItemOp::Remove,
                    item_key: key,
                    message: error.to_string(),
                })
            }));
        }
    }

    let added = cand_keys
        .keys()
        .filter(|k| !base_keys.contains_key(*k))
        .count();
    let removed = base_keys
        .keys()
        .filter(|k| !cand_keys.contains_key(*k))
        .count();

    // Fan out, then fan in; sibling failures never cancel each other.
    let failures: Vec<ItemFailure> = join_all(ops).await.into_iter().flatten().collect();

    FieldOutcome {
        field: field.to_string(),
        added,
        removed,
        failures,
    }
}

/// Keys a list by the handler's identity function. Items without an
/// identity cannot be matched and are skipped.
fn key_items<'a>(items: &'a [Value], id_of: &IdOf) -> HashMap<String, &'a Value> {
    let mut keyed = HashMap::with_capacity(items.len());
    for item in items {
        match id_of(item) {
            Some(key) => {
                keyed.insert(key, item);
            }
            None => debug!("list item without identity skipped"),
        }
    }
    keyed
}
