//! The save pipeline.
//!
//! Installed by the coordinator as the queue's transport, it composes
//! one full save attempt: baseline pre-filter, cached validation, list
//! reconciliation, the main transport call, and baseline/checkpoint
//! commits. The queue stays generic — it sees one transport that
//! either confirms the whole cycle or fails it.

use crate::config::AutosaveConfig;
use crate::error::{AutosaveError, AutosaveResult};
use crate::history::HistoryEngine;
use crate::metrics::SaveMetrics;
use crate::reconcile::ReconcileEngine;
use crate::source::RecordSource;
use crate::transport::SaveTransport;
use async_trait::async_trait;
use draftsync_types::{Payload, SaveAck, SaveContext};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One full save attempt, composed over the injected transport.
pub struct SavePipeline {
    transport: Arc<dyn SaveTransport>,
    source: Arc<dyn RecordSource>,
    reconcile: Arc<ReconcileEngine>,
    history: Arc<HistoryEngine>,
    metrics: Arc<SaveMetrics>,
    validation: Mutex<ValidationCache>,
}

impl SavePipeline {
    /// Builds the pipeline around the real transport.
    pub fn new(
        transport: Arc<dyn SaveTransport>,
        source: Arc<dyn RecordSource>,
        reconcile: Arc<ReconcileEngine>,
        history: Arc<HistoryEngine>,
        config: &AutosaveConfig,
        metrics: Arc<SaveMetrics>,
    ) -> Self {
        Self {
            transport,
            source,
            reconcile,
            history,
            metrics,
            validation: Mutex::new(ValidationCache::new(
                config.validation_cache_size,
                Duration::from_millis(config.validation_cache_ttl_ms),
            )),
        }
    }

    /// Validates the payload's fields, consulting the verdict cache.
    ///
    /// The cache is what makes a rejected payload "skipped, not
    /// retried": until the fields change, repeated attempts resolve
    /// from cache without re-running validation.
    async fn validate(&self, payload: &Payload) -> AutosaveResult<bool> {
        let signature = payload_signature(payload);
        {
            let mut cache = self.validation.lock().await;
            if let Some(verdict) = cache.get(signature) {
                self.metrics.record_cache_hit();
                return Ok(verdict);
            }
        }
        self.metrics.record_cache_miss();

        let fields: Vec<String> = payload.keys().cloned().collect();
        let verdict = self.source.validate(&fields).await?;
        self.validation.lock().await.insert(signature, verdict);
        Ok(verdict)
    }
}

#[async_trait]
impl SaveTransport for SavePipeline {
    async fn save(&self, payload: &Payload, ctx: &SaveContext) -> AutosaveResult<SaveAck> {
        let mut working = payload.clone();

        // Fields already equivalent to the baseline are persisted; a
        // payload queued by an undo back to the saved state can empty
        // out entirely here.
        self.reconcile.strip_unchanged(&mut working).await;
        if working.is_empty() {
            debug!("payload matches baseline, nothing to persist");
            return Ok(SaveAck::new());
        }

        if !self.validate(&working).await? {
            let fields: Vec<String> = working.keys().cloned().collect();
            debug!(?fields, "validation rejected payload, save skipped");
            return Err(AutosaveError::Validation { fields });
        }

        let outcomes = self.reconcile.reconcile_lists(&mut working).await;
        let failures: Vec<_> = outcomes
            .iter()
            .flat_map(|o| o.failures.iter().cloned())
            .collect();

        let main_result = if working.is_empty() {
            Ok(SaveAck::new())
        } else {
            self.transport.save(&working, ctx).await
        };

        match main_result {
            Ok(ack) => {
                self.reconcile.commit_saved(&working).await;
                if failures.is_empty() {
                    self.history.mark_checkpoint().await;
                    Ok(ack)
                } else {
                    // Failed list fields come back with the re-queued
                    // payload; their baselines were withheld.
                    Err(AutosaveError::Reconcile { failures })
                }
            }
            Err(error) => {
                if !failures.is_empty() {
                    warn!(
                        list_failures = failures.len(),
                        "main save failed alongside list reconciliation failures"
                    );
                }
                Err(error)
            }
        }
    }
}

/// Capacity-bounded, TTL-expiring cache of validation verdicts,
/// keyed by payload signature.
struct ValidationCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<u64, CacheEntry>,
    order: VecDeque<u64>,
}

struct CacheEntry {
    verdict: bool,
    stored_at: Instant,
}

impl ValidationCache {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, signature: u64) -> Option<bool> {
        let entry = self.entries.get(&signature)?;
        if entry.stored_at.elapsed() > self.ttl {
            self.entries.remove(&signature);
            self.order.retain(|s| *s != signature);
            return None;
        }
        Some(entry.verdict)
    }

    fn insert(&mut self, signature: u64, verdict: bool) {
        let entry = CacheEntry {
            verdict,
            stored_at: Instant::now(),
        };
        if self.entries.insert(signature, entry).is_none() {
            self.order.push_back(signature);
        }
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }
}

/// Hashes a payload's paths and values into a cache signature.
/// `BTreeMap` iteration order makes this deterministic.
fn payload_signature(payload: &Payload) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (path, value) in payload {
        path.hash(&mut hasher);
        // Values are not Hash; their serialized form is stable.
        match serde_json::to_string(value) {
            Ok(json) => json.hash(&mut hasher),
            Err(_) => format!("{value:?}").hash(&mut hasher),
        }
    }
    hasher.finish()
}
