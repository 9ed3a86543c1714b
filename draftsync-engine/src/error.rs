//! Error types for the autosave core.
//!
//! Every error carries a machine-readable code via [`AutosaveError::code`]
//! so callers can branch without string-matching messages. Errors are
//! cheap to clone: the failing payload is re-queued and its error is
//! surfaced through status channels as well as the call site.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for autosave operations.
pub type AutosaveResult<T> = Result<T, AutosaveError>;

/// Errors that can occur in the autosave pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutosaveError {
    /// The transport failed or reported a failure.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the originating failure.
        message: String,
    },

    /// Pre-save validation rejected the payload. Not retried until the
    /// named fields change again.
    #[error("validation failed for fields: {}", .fields.join(", "))]
    Validation {
        /// The fields that were submitted for validation.
        fields: Vec<String>,
    },

    /// One or more per-item list reconciliation operations failed.
    #[error("list reconciliation failed: {}", summarize(.failures))]
    Reconcile {
        /// Every item-level failure, across fields.
        failures: Vec<ItemFailure>,
    },

    /// The attempt was aborted before completion.
    #[error("save aborted")]
    Aborted,

    /// A configuration value was out of range.
    #[error("invalid config: {0}")]
    Config(String),
}

impl AutosaveError {
    /// Wraps a transport-layer failure.
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: cause.to_string(),
        }
    }

    /// The machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::Reconcile { .. } => "DIFF_ERROR",
            Self::Aborted => "ABORTED",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Which side of a list reconciliation an item failure occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemOp {
    /// The item was being added.
    Add,
    /// The item was being removed.
    Remove,
}

impl std::fmt::Display for ItemOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemOp::Add => write!(f, "add"),
            ItemOp::Remove => write!(f, "remove"),
        }
    }
}

/// A single failed add/remove operation during list reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// The list field being reconciled.
    pub field: String,
    /// Whether the item was being added or removed.
    pub op: ItemOp,
    /// The identity key of the item.
    pub item_key: String,
    /// Description of the failure.
    pub message: String,
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.field, self.item_key, self.op, self.message
        )
    }
}

fn summarize(failures: &[ItemFailure]) -> String {
    failures
        .iter()
        .map(ItemFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            AutosaveError::transport("connection refused").code(),
            "TRANSPORT_ERROR"
        );
        assert_eq!(
            AutosaveError::Validation { fields: vec![] }.code(),
            "VALIDATION_FAILED"
        );
        assert_eq!(
            AutosaveError::Reconcile { failures: vec![] }.code(),
            "DIFF_ERROR"
        );
    }

    #[test]
    fn reconcile_message_enumerates_failures() {
        let error = AutosaveError::Reconcile {
            failures: vec![
                ItemFailure {
                    field: "memberships".into(),
                    op: ItemOp::Remove,
                    item_key: "1".into(),
                    message: "forbidden".into(),
                },
                ItemFailure {
                    field: "memberships".into(),
                    op: ItemOp::Add,
                    item_key: "3".into(),
                    message: "timeout".into(),
                },
            ],
        };

        let message = error.to_string();
        assert!(message.contains("memberships[1] remove: forbidden"));
        assert!(message.contains("memberships[3] add: timeout"));
    }
}
