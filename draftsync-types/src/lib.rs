//! Shared data model for the DraftSync autosave core.
//!
//! This crate defines the vocabulary the engines speak:
//!
//! - [`Value`] / [`Snapshot`] — the record value tree and one observed
//!   state of it
//! - [`Patch`] / [`HistoryEntry`] — field-level diffs and the atomic
//!   edit groups the history engine stores
//! - [`SaveContext`] / [`SaveAck`] / [`SaveOutcome`] — what a transport
//!   attempt receives and reports
//! - [`EditOrigin`] — the replay marker threaded through field writes
//!
//! No I/O and no engine state lives here.

mod ids;
mod patch;
mod save;
mod value;

pub use ids::AttemptId;
pub use patch::{HistoryEntry, Patch};
pub use save::{CancelToken, EditOrigin, SaveAck, SaveContext, SaveOutcome};
pub use value::{root_field, Payload, Snapshot, Value};
