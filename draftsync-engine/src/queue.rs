//! The save queue.
//!
//! Owns the pending-payload accumulator, the debounce timer, and the
//! single-flight invariant: at most one transport call for the main
//! payload is ever in flight. A flush requested while one is running
//! sets a rerun flag consumed when it settles, never a second call.
//!
//! Failure never drops data: the taken payload is merged back under
//! anything queued meanwhile (newer values win per path) and stays
//! pending for a later attempt.

use crate::config::AutosaveConfig;
use crate::error::{AutosaveError, AutosaveResult};
use crate::metrics::SaveMetrics;
use crate::transport::SaveTransport;
use draftsync_types::{CancelToken, Payload, SaveContext, SaveOutcome};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Observable queue state, published on every transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueStatus {
    /// Whether a transport call is in flight.
    pub is_saving: bool,
    /// Number of field paths waiting to be saved.
    pub pending_fields: usize,
    /// Consecutive failed attempts since the last success.
    pub consecutive_failures: u32,
    /// The most recent failure, cleared on success.
    pub last_error: Option<AutosaveError>,
}

/// The debounced, single-flight save queue.
///
/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct SaveQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    transport: Arc<dyn SaveTransport>,
    debounce_ms: u64,
    max_retries: u32,
    metrics: Arc<SaveMetrics>,
    state: Mutex<QueueState>,
    status_tx: watch::Sender<QueueStatus>,
}

#[derive(Default)]
struct QueueState {
    pending: Payload,
    inflight: bool,
    rerun_requested: bool,
    consecutive_failures: u32,
    timer_generation: u64,
    inflight_cancel: Option<CancelToken>,
    last_error: Option<AutosaveError>,
}

impl SaveQueue {
    /// Creates a queue around an injected transport.
    pub fn new(
        transport: Arc<dyn SaveTransport>,
        config: &AutosaveConfig,
        metrics: Arc<SaveMetrics>,
    ) -> Self {
        let (status_tx, _) = watch::channel(QueueStatus::default());
        Self {
            inner: Arc::new(QueueInner {
                transport,
                debounce_ms: config.debounce_ms,
                max_retries: config.max_retries,
                metrics,
                state: Mutex::new(QueueState::default()),
                status_tx,
            }),
        }
    }

    /// Merges a delta into the pending payload and (re)arms the
    /// debounce timer. Each new change restarts the full window, so a
    /// burst collapses into one flush after the last change.
    ///
    /// With `debounce_ms == 0` the change flushes immediately and the
    /// flush result is returned.
    pub async fn queue_change(&self, delta: Payload) -> AutosaveResult<SaveOutcome> {
        if delta.is_empty() {
            return Ok(SaveOutcome::NothingToSave);
        }

        {
            let mut state = self.inner.state.lock().await;
            for (path, value) in delta {
                state.pending.insert(path, value);
            }
            self.publish(&state);
        }

        if self.inner.debounce_ms == 0 {
            self.flush().await
        } else {
            self.arm_timer().await;
            Ok(SaveOutcome::Deferred)
        }
    }

    /// Replaces the pending payload wholesale with a freshly computed
    /// delta.
    ///
    /// Used after undo/redo replays: the baseline delta is the
    /// complete set of unsaved differences, and values queued before
    /// the replay may be stale. An empty delta clears pending state
    /// and disarms the timer. With `schedule` false the payload is
    /// swapped without arming a flush.
    pub async fn replace_pending(
        &self,
        delta: Payload,
        schedule: bool,
    ) -> AutosaveResult<SaveOutcome> {
        {
            let mut state = self.inner.state.lock().await;
            state.pending = delta;
            if state.pending.is_empty() {
                state.timer_generation += 1;
                self.publish(&state);
                return Ok(SaveOutcome::NothingToSave);
            }
            self.publish(&state);
        }

        if !schedule {
            return Ok(SaveOutcome::NothingToSave);
        }
        if self.inner.debounce_ms == 0 {
            self.flush().await
        } else {
            self.arm_timer().await;
            Ok(SaveOutcome::Deferred)
        }
    }

    /// Flushes the pending payload through the transport.
    ///
    /// Returns `NothingToSave` when the payload is empty, `Deferred`
    /// when another attempt is in flight (a rerun will follow — the
    /// data is not saved yet), and `Saved` once the transport
    /// confirms. A scheduled timer is cancelled; flushing proceeds
    /// immediately.
    pub async fn flush(&self) -> AutosaveResult<SaveOutcome> {
        let (payload, ctx) = {
            let mut state = self.inner.state.lock().await;
            state.timer_generation += 1;

            if state.inflight {
                state.rerun_requested = true;
                debug!("flush requested while inflight, rerun scheduled");
                return Ok(SaveOutcome::Deferred);
            }
            if state.pending.is_empty() {
                return Ok(SaveOutcome::NothingToSave);
            }

            let payload = std::mem::take(&mut state.pending);
            let cancel = CancelToken::new();
            state.inflight = true;
            state.inflight_cancel = Some(cancel.clone());
            let ctx = SaveContext::with_token(cancel, state.consecutive_failures);
            self.publish(&state);
            (payload, ctx)
        };

        self.inner.metrics.record_attempt(ctx.retry_count > 0);
        debug!(
            attempt = %ctx.attempt_id,
            fields = payload.len(),
            retry = ctx.retry_count,
            "save attempt started"
        );

        let started = Instant::now();
        let result = self.inner.transport.save(&payload, &ctx).await;
        let elapsed = started.elapsed();

        let (outcome, rerun) = {
            let mut state = self.inner.state.lock().await;
            state.inflight = false;
            state.inflight_cancel = None;
            let rerun = std::mem::take(&mut state.rerun_requested);

            let outcome = match result {
                Ok(ack) => {
                    state.consecutive_failures = 0;
                    state.last_error = None;
                    self.inner.metrics.record_success(elapsed);
                    info!(attempt = %ctx.attempt_id, "save confirmed");
                    Ok(SaveOutcome::Saved(ack))
                }
                Err(error) => {
                    if ctx.cancel.is_cancelled() {
                        // The attempt was aborted; its payload is
                        // intentionally discarded, not re-queued.
                        debug!(attempt = %ctx.attempt_id, "aborted attempt settled");
                    } else {
                        // Fields queued while we were in flight are
                        // newer than the failed attempt and win on
                        // conflict.
                        for (path, value) in payload {
                            state.pending.entry(path).or_insert(value);
                        }
                    }
                    state.consecutive_failures += 1;
                    self.inner.metrics.record_failure(elapsed);
                    if state.consecutive_failures > self.inner.max_retries {
                        warn!(
                            failures = state.consecutive_failures,
                            max_retries = self.inner.max_retries,
                            "save failed, retry ceiling exceeded; payload stays queued"
                        );
                    } else {
                        warn!(
                            failures = state.consecutive_failures,
                            max_retries = self.inner.max_retries,
                            error = %error,
                            "save failed, payload re-queued"
                        );
                    }
                    state.last_error = Some(error.clone());
                    Err(error)
                }
            };
            self.publish(&state);
            (outcome, rerun)
        };

        if rerun {
            if self.inner.debounce_ms == 0 {
                self.spawn_flush();
            } else {
                self.arm_timer().await;
            }
        }

        outcome
    }

    /// Discards everything: pending payload, scheduled timer, rerun
    /// flag. Signals the inflight attempt's cancellation token
    /// (best-effort — the remote side effect may still have occurred).
    pub async fn abort(&self) {
        let mut state = self.inner.state.lock().await;
        state.pending.clear();
        state.timer_generation += 1;
        state.rerun_requested = false;
        if let Some(cancel) = &state.inflight_cancel {
            cancel.cancel();
        }
        self.publish(&state);
        info!("autosave aborted, pending changes discarded");
    }

    /// Subscribes to queue status transitions.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<QueueStatus> {
        self.inner.status_tx.subscribe()
    }

    /// The field paths currently pending.
    pub async fn pending_fields(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .await
            .pending
            .keys()
            .cloned()
            .collect()
    }

    /// Whether anything is waiting to be saved.
    pub async fn has_pending(&self) -> bool {
        !self.inner.state.lock().await.pending.is_empty()
    }

    /// The metrics sink shared with the rest of the pipeline.
    #[must_use]
    pub fn metrics(&self) -> Arc<SaveMetrics> {
        self.inner.metrics.clone()
    }

    /// Arms the debounce timer for the full window, invalidating any
    /// previously armed timer.
    async fn arm_timer(&self) {
        let generation = {
            let mut state = self.inner.state.lock().await;
            state.timer_generation += 1;
            state.timer_generation
        };

        let window = Duration::from_millis(self.inner.debounce_ms);
        self.spawn_timer(generation, window);
    }

    /// Spawns the detached debounce-timer task. Kept out of
    /// `arm_timer`'s own `async` body — which `flush` awaits — so the
    /// `Send` obligation on this recursive future does not re-enter the
    /// `flush`/`arm_timer` auto-trait cycle.
    fn spawn_timer(&self, generation: u64, window: Duration) {
        let queue = self.clone();
        let fut: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            tokio::time::sleep(window).await;
            let current = queue.inner.state.lock().await.timer_generation == generation;
            if current {
                // Errors are already recorded in queue state; the
                // detached timer has nowhere to report them.
                let _ = queue.flush().await;
            } else {
                debug!("debounce timer superseded");
            }
        });
        tokio::spawn(fut);
    }

    /// Spawns a detached flush. Boxing behind an explicit `Send` bound
    /// breaks the recursive-`async` auto-trait cycle that blocks
    /// `tokio::spawn` from inferring `Send` for a call back into
    /// `flush`.
    fn spawn_flush(&self) {
        let queue = self.clone();
        let fut: Pin<Box<dyn Future<Output = AutosaveResult<SaveOutcome>> + Send>> =
            Box::pin(async move { queue.flush().await });
        tokio::spawn(fut);
    }

    fn publish(&self, state: &QueueState) {
        self.inner.status_tx.send_replace(QueueStatus {
            is_saving: state.inflight,
            pending_fields: state.pending.len(),
            consecutive_failures: state.consecutive_failures,
            last_error: state.last_error.clone(),
        });
    }
}
