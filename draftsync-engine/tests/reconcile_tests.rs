use draftsync_engine::{
    AutosaveError, AutosaveResult, DiffHandler, ItemCallback, ItemOp, Payload, ReconcileEngine,
    Snapshot, Value,
};
use futures::future::BoxFuture;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

fn item(id: i64) -> Value {
    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::Int(id));
    Value::Map(map)
}

fn snapshot(fields: &[(&str, Value)]) -> Snapshot {
    Snapshot::from_fields(fields.iter().map(|(k, v)| (*k, v.clone())))
}

fn payload(entries: &[(&str, Value)]) -> Payload {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn recording(log: Arc<Mutex<Vec<Value>>>) -> ItemCallback {
    Arc::new(move |item: Value| {
        let log = log.clone();
        Box::pin(async move {
            log.lock().unwrap().push(item);
            Ok(())
        }) as BoxFuture<'static, AutosaveResult<()>>
    })
}

fn failing(message: &str) -> ItemCallback {
    let message = message.to_string();
    Arc::new(move |_item: Value| {
        let message = message.clone();
        Box::pin(async move { Err(AutosaveError::transport(message)) })
            as BoxFuture<'static, AutosaveResult<()>>
    })
}

// ── Baseline lifecycle ───────────────────────────────────────────

#[tokio::test]
async fn adopt_if_absent_takes_only_the_first_snapshot() {
    let engine = ReconcileEngine::new();

    assert!(engine.adopt_if_absent(&snapshot(&[("a", Value::Int(1))])).await);
    assert!(!engine.adopt_if_absent(&snapshot(&[("a", Value::Int(9))])).await);

    let baseline = engine.baseline().await.unwrap();
    assert_eq!(baseline.get("a"), Some(&Value::Int(1)));
}

#[tokio::test]
async fn force_baseline_replaces_wholesale() {
    let engine = ReconcileEngine::new();
    engine.adopt_if_absent(&snapshot(&[("a", Value::Int(1))])).await;

    engine.force_baseline(snapshot(&[("b", Value::Int(2))])).await;

    let baseline = engine.baseline().await.unwrap();
    assert!(baseline.get("a").is_none());
    assert_eq!(baseline.get("b"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn commit_saved_merges_keys_never_replaces() {
    let engine = ReconcileEngine::new();
    engine
        .force_baseline(snapshot(&[("a", Value::Int(1)), ("b", Value::Int(2))]))
        .await;

    engine.commit_saved(&payload(&[("b", Value::Int(9))])).await;

    let baseline = engine.baseline().await.unwrap();
    assert_eq!(baseline.get("a"), Some(&Value::Int(1)));
    assert_eq!(baseline.get("b"), Some(&Value::Int(9)));
}

#[tokio::test]
async fn clear_baseline_is_suppressed_while_hydrating() {
    let engine = ReconcileEngine::new();
    engine.force_baseline(snapshot(&[("a", Value::Int(1))])).await;

    engine.set_hydrating(true).await;
    engine.clear_baseline().await;
    assert!(engine.baseline().await.is_some());

    engine.set_hydrating(false).await;
    engine.clear_baseline().await;
    assert!(engine.baseline().await.is_none());
}

// ── Payload computation ──────────────────────────────────────────

#[tokio::test]
async fn changed_since_baseline_excludes_unchanged_fields() {
    let engine = ReconcileEngine::new();
    engine
        .force_baseline(snapshot(&[("a", Value::Int(1)), ("b", Value::Int(2))]))
        .await;

    let current = snapshot(&[("a", Value::Int(1)), ("b", Value::Int(3)), ("c", Value::Int(4))]);
    let delta = engine.changed_since_baseline(&current).await;

    assert_eq!(delta, payload(&[("b", Value::Int(3)), ("c", Value::Int(4))]));
}

#[tokio::test]
async fn changed_since_baseline_reports_removed_fields_as_null() {
    let engine = ReconcileEngine::new();
    engine.force_baseline(snapshot(&[("a", Value::Int(1))])).await;

    let delta = engine.changed_since_baseline(&Snapshot::new()).await;
    assert_eq!(delta, payload(&[("a", Value::Null)]));
}

#[tokio::test]
async fn changed_since_baseline_without_baseline_returns_everything() {
    let engine = ReconcileEngine::new();
    let current = snapshot(&[("a", Value::Int(1))]);

    let delta = engine.changed_since_baseline(&current).await;
    assert_eq!(delta, payload(&[("a", Value::Int(1))]));
}

#[tokio::test]
async fn strip_unchanged_drops_fields_matching_baseline() {
    let engine = ReconcileEngine::new();
    engine
        .force_baseline(snapshot(&[("a", Value::Int(1)), ("b", Value::Int(2))]))
        .await;

    let mut working = payload(&[("a", Value::Int(1)), ("b", Value::Int(5))]);
    engine.strip_unchanged(&mut working).await;

    assert_eq!(working, payload(&[("b", Value::Int(5))]));
}

// ── List reconciliation ──────────────────────────────────────────

#[tokio::test]
async fn list_diff_invokes_add_and_remove_and_strips_the_field() {
    let engine = ReconcileEngine::new();
    engine
        .force_baseline(snapshot(&[(
            "memberships",
            Value::List(vec![item(1), item(2)]),
        )]))
        .await;

    let added = Arc::new(Mutex::new(Vec::new()));
    let removed = Arc::new(Mutex::new(Vec::new()));
    engine
        .register_handler(
            "memberships",
            DiffHandler::by_item_id(recording(added.clone()), recording(removed.clone())),
        )
        .await;

    let mut working = payload(&[
        ("memberships", Value::List(vec![item(2), item(3)])),
        ("title", Value::from("kept")),
    ]);
    let outcomes = engine.reconcile_lists(&mut working).await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].succeeded());
    assert_eq!(outcomes[0].added, 1);
    assert_eq!(outcomes[0].removed, 1);

    assert_eq!(added.lock().unwrap().as_slice(), &[item(3)]);
    assert_eq!(removed.lock().unwrap().as_slice(), &[item(1)]);

    // The field was persisted via side effects, not as a bulk field.
    assert_eq!(working, payload(&[("title", Value::from("kept"))]));
}

#[tokio::test]
async fn successful_list_field_advances_its_baseline() {
    let engine = ReconcileEngine::new();
    engine
        .force_baseline(snapshot(&[("memberships", Value::List(vec![item(1)]))]))
        .await;
    engine
        .register_handler(
            "memberships",
            DiffHandler::by_item_id(
                recording(Arc::new(Mutex::new(Vec::new()))),
                recording(Arc::new(Mutex::new(Vec::new()))),
            ),
        )
        .await;

    let candidate = Value::List(vec![item(1), item(2)]);
    let mut working = payload(&[("memberships", candidate.clone())]);
    engine.reconcile_lists(&mut working).await;

    let baseline = engine.baseline().await.unwrap();
    assert_eq!(baseline.get("memberships"), Some(&candidate));
}

#[tokio::test]
async fn failed_list_field_keeps_its_baseline_and_reports_items() {
    let engine = ReconcileEngine::new();
    let original = Value::List(vec![item(1), item(2)]);
    engine
        .force_baseline(snapshot(&[("memberships", original.clone())]))
        .await;
    engine
        .register_handler(
            "memberships",
            DiffHandler::by_item_id(
                recording(Arc::new(Mutex::new(Vec::new()))),
                failing("forbidden"),
            ),
        )
        .await;

    let mut working = payload(&[("memberships", Value::List(vec![item(2), item(3)]))]);
    let outcomes = engine.reconcile_lists(&mut working).await;

    assert!(!outcomes[0].succeeded());
    assert_eq!(outcomes[0].failures.len(), 1);
    assert_eq!(outcomes[0].failures[0].op, ItemOp::Remove);
    assert_eq!(outcomes[0].failures[0].item_key, "1");
    assert_eq!(outcomes[0].failures[0].field, "memberships");

    // Baseline withheld for the failed field.
    let baseline = engine.baseline().await.unwrap();
    assert_eq!(baseline.get("memberships"), Some(&original));
    // The field still never rides the bulk payload.
    assert!(working.is_empty());
}

#[tokio::test]
async fn one_item_failure_does_not_cancel_the_others() {
    let engine = ReconcileEngine::new();
    engine
        .force_baseline(snapshot(&[("memberships", Value::List(vec![item(1)]))]))
        .await;

    let added = Arc::new(Mutex::new(Vec::new()));
    engine
        .register_handler(
            "memberships",
            DiffHandler::by_item_id(recording(added.clone()), failing("forbidden")),
        )
        .await;

    let mut working = payload(&[("memberships", Value::List(vec![item(2), item(3)]))]);
    let outcomes = engine.reconcile_lists(&mut working).await;

    // Both adds ran to completion despite the failed remove.
    assert_eq!(added.lock().unwrap().len(), 2);
    assert_eq!(outcomes[0].failures.len(), 1);
}

#[tokio::test]
async fn items_without_identity_are_ignored() {
    let engine = ReconcileEngine::new();
    engine
        .force_baseline(snapshot(&[("memberships", Value::List(vec![]))]))
        .await;

    let added = Arc::new(Mutex::new(Vec::new()));
    engine
        .register_handler(
            "memberships",
            DiffHandler::by_item_id(
                recording(added.clone()),
                recording(Arc::new(Mutex::new(Vec::new()))),
            ),
        )
        .await;

    let mut working = payload(&[(
        "memberships",
        Value::List(vec![item(1), Value::from("no-id")]),
    )]);
    engine.reconcile_lists(&mut working).await;

    assert_eq!(added.lock().unwrap().as_slice(), &[item(1)]);
}

#[tokio::test]
async fn fields_without_handlers_stay_in_the_payload() {
    let engine = ReconcileEngine::new();
    let mut working = payload(&[("tags", Value::List(vec![item(1)]))]);

    let outcomes = engine.reconcile_lists(&mut working).await;

    assert!(outcomes.is_empty());
    assert_eq!(working.len(), 1);
}
