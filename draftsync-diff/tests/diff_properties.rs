//! Property-based tests for the structural diff.
//!
//! The diff must satisfy:
//! - Reflexivity: diff(x, x) is empty
//! - Patch law: applying the `next` values of diff(a, b) onto `a`
//!   yields a snapshot the diff considers equal to `b`
//! - Inverse law: applying the `prev` values of diff(a, b) onto `b`
//!   yields a snapshot the diff considers equal to `a`

use draftsync_diff::diff_snapshots;
use draftsync_types::{Patch, Snapshot, Value};
use proptest::prelude::*;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::Int),
        "[a-z]{0,8}".prop_map(Value::Text),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-c]", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    prop::collection::btree_map("[a-d]{1,3}", value_strategy(), 0..5).prop_map(Snapshot::from)
}

fn apply_forward(base: &Snapshot, patches: &[Patch]) -> Snapshot {
    let mut out = base.clone();
    for patch in patches {
        out.set_value_at(&patch.path, patch.next.clone());
    }
    out
}

fn apply_backward(base: &Snapshot, patches: &[Patch]) -> Snapshot {
    let mut out = base.clone();
    for patch in patches {
        out.set_value_at(&patch.path, patch.prev.clone());
    }
    out
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    /// Reflexivity: a snapshot never differs from itself.
    #[test]
    fn diff_of_identical_snapshots_is_empty(snap in snapshot_strategy()) {
        prop_assert!(diff_snapshots(&snap, &snap).is_empty());
    }

    /// Patch law: the emitted patches are sufficient to reach `next`.
    #[test]
    fn applying_patches_reaches_next(
        prev in snapshot_strategy(),
        next in snapshot_strategy(),
    ) {
        let patches = diff_snapshots(&prev, &next);
        let reached = apply_forward(&prev, &patches);
        prop_assert!(diff_snapshots(&reached, &next).is_empty());
    }

    /// Inverse law: the same patches, applied backwards, restore `prev`.
    #[test]
    fn applying_patches_backwards_restores_prev(
        prev in snapshot_strategy(),
        next in snapshot_strategy(),
    ) {
        let patches = diff_snapshots(&prev, &next);
        let restored = apply_backward(&next, &patches);
        prop_assert!(diff_snapshots(&restored, &prev).is_empty());
    }
}
