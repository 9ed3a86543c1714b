//! Save attempt context and outcomes.
//!
//! Every transport invocation gets a fresh [`SaveContext`] carrying a
//! time-ordered attempt ID, a cooperative cancellation token, and the
//! consecutive-failure count at the moment the attempt started.

use crate::ids::AttemptId;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Where a field write originated.
///
/// The recorder uses this to distinguish genuinely new user edits
/// (which are recorded into history and may invalidate redo) from
/// replayed writes (which must not be re-recorded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditOrigin {
    /// A new user-originated edit.
    User,
    /// A write applied while undoing.
    Undo,
    /// A write applied while redoing.
    Redo,
    /// A write applied while replaying server state into the record.
    Hydration,
}

impl EditOrigin {
    /// True for writes that replay existing state rather than create
    /// new edits.
    #[must_use]
    pub fn is_replay(self) -> bool {
        !matches!(self, EditOrigin::User)
    }
}

/// A clonable cooperative cancellation token.
///
/// Cancelling is best-effort: the transport may observe the token or
/// ignore it, and cancellation never guarantees the remote side effect
/// did not occur.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation and wakes all waiters.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns true once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves when the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Context for a single transport invocation.
#[derive(Debug, Clone)]
pub struct SaveContext {
    /// Time-ordered identifier for this attempt.
    pub attempt_id: AttemptId,
    /// Cooperative cancellation token; `abort()` signals it.
    pub cancel: CancelToken,
    /// When the attempt was constructed.
    pub started_at: DateTime<Utc>,
    /// Consecutive failures preceding this attempt.
    pub retry_count: u32,
}

impl SaveContext {
    /// Creates a context with a fresh token.
    #[must_use]
    pub fn new(retry_count: u32) -> Self {
        Self::with_token(CancelToken::new(), retry_count)
    }

    /// Creates a context around an existing token, so `abort()` can
    /// reach the inflight attempt.
    #[must_use]
    pub fn with_token(cancel: CancelToken, retry_count: u32) -> Self {
        Self {
            attempt_id: AttemptId::new(),
            cancel,
            started_at: Utc::now(),
            retry_count,
        }
    }
}

/// A successful transport acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveAck {
    /// Server-assigned record version, when the backend reports one.
    pub version: Option<u64>,
    /// Backend-defined extra response data.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl SaveAck {
    /// An empty acknowledgement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An acknowledgement carrying a record version.
    #[must_use]
    pub fn with_version(version: u64) -> Self {
        Self {
            version: Some(version),
            metadata: BTreeMap::new(),
        }
    }
}

/// What a flush-shaped operation actually did.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The transport ran and confirmed persistence.
    Saved(SaveAck),
    /// Nothing was pending; the transport was not called.
    NothingToSave,
    /// Another attempt is in flight; a rerun was requested. The data
    /// is NOT saved yet.
    Deferred,
}

impl SaveOutcome {
    /// True only when the transport confirmed persistence.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        token.cancel();
        handle.await.expect("waiter completes");
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
    }

    #[test]
    fn context_carries_retry_count() {
        let ctx = SaveContext::new(2);
        assert_eq!(ctx.retry_count, 2);
        assert!(!ctx.cancel.is_cancelled());
    }
}
