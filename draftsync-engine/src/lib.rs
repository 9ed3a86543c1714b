//! Autosave coordination engines for DraftSync.
//!
//! Coordinates optimistic, asynchronous persistence of incrementally
//! edited records against a remote store, alongside local time-travel
//! over the same edits.
//!
//! # Architecture
//!
//! Three engines own the shared mutable state, one concern each:
//!
//! - **[`SaveQueue`]**: coalesces edit bursts behind a debounce
//!   window, keeps at most one transport call in flight, and re-merges
//!   failed payloads for later attempts.
//! - **[`HistoryEngine`]**: past/future stacks of structural diffs
//!   with save-point checkpoints; replays values through the data
//!   source under an explicit origin marker.
//! - **[`ReconcileEngine`]**: tracks the baseline (last confirmed
//!   persisted snapshot), computes minimal payloads against it, and
//!   reconciles list-valued fields via per-item add/remove callbacks.
//!
//! [`Autosaver`] composes the three over an injected [`RecordSource`]
//! and [`SaveTransport`].
//!
//! # Data flow
//!
//! 1. Edits land in the data source; `observe` diffs consecutive
//!    snapshots into patches
//! 2. Patches are recorded as one history entry (unless replaying)
//! 3. Changed fields are queued; the debounce window coalesces bursts
//! 4. At flush, the pipeline validates, reconciles list fields via
//!    their handlers, and sends the rest through the transport
//! 5. Success advances the baseline and marks a history checkpoint;
//!    failure re-merges the payload under anything queued meanwhile
//!
//! # Example
//!
//! ```no_run
//! use draftsync_engine::{Autosaver, AutosaveConfig};
//! use draftsync_engine::source::mock::MockSource;
//! use draftsync_engine::transport::mock::MockTransport;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), draftsync_engine::AutosaveError> {
//! let source = Arc::new(MockSource::new());
//! let transport = Arc::new(MockTransport::new());
//! let autosaver = Autosaver::new(source, transport, AutosaveConfig::default())?;
//!
//! autosaver.observe().await?;   // after edits settle
//! autosaver.flush().await?;     // save now
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod error;
mod history;
mod metrics;
mod pipeline;
mod queue;
mod reconcile;
pub mod source;
pub mod transport;

pub use config::AutosaveConfig;
pub use coordinator::Autosaver;
pub use error::{AutosaveError, AutosaveResult, ItemFailure, ItemOp};
pub use history::{HistoryEngine, HistoryStatus};
pub use metrics::{MetricsSnapshot, SaveMetrics};
pub use pipeline::SavePipeline;
pub use queue::{QueueStatus, SaveQueue};
pub use reconcile::{DiffHandler, FieldOutcome, IdOf, ItemCallback, ReconcileEngine};
pub use source::{FieldAccess, RecordSource};
pub use transport::SaveTransport;

// Re-export the shared data model so embedders need one import.
pub use draftsync_types::{
    AttemptId, CancelToken, EditOrigin, HistoryEntry, Patch, Payload, SaveAck, SaveContext,
    SaveOutcome, Snapshot, Value,
};
