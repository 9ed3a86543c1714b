//! Configuration for the autosave engines.

use crate::error::{AutosaveError, AutosaveResult};
use serde::{Deserialize, Serialize};

/// Configuration consumed (not owned) by the autosave core.
///
/// All values are read once at construction; the engines never mutate
/// them. `validate` performs the range checks the embedding config
/// loader is expected to run before handing the struct over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveConfig {
    /// Debounce window in milliseconds. Zero means every queued change
    /// flushes immediately, with no coalescing.
    pub debounce_ms: u64,
    /// Consecutive-failure ceiling. Exceeding it is reported, not
    /// fatal; the payload stays queued.
    pub max_retries: u32,
    /// Maximum retained undo entries; oldest are evicted first.
    pub history_capacity: usize,
    /// Whether undo/redo themselves queue a save.
    pub save_on_history_nav: bool,
    /// Maximum entries in the validation verdict cache.
    pub validation_cache_size: usize,
    /// Time-to-live for cached validation verdicts, in milliseconds.
    pub validation_cache_ttl_ms: u64,
    /// Whether to collect save metrics.
    pub enable_metrics: bool,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 800,
            max_retries: 3,
            history_capacity: 100,
            save_on_history_nav: true,
            validation_cache_size: 64,
            validation_cache_ttl_ms: 30_000,
            enable_metrics: true,
        }
    }
}

impl AutosaveConfig {
    /// Checks every value against its documented range.
    pub fn validate(&self) -> AutosaveResult<()> {
        if self.debounce_ms > 600_000 {
            return Err(AutosaveError::Config(format!(
                "debounce_ms must be at most 600000, got {}",
                self.debounce_ms
            )));
        }
        if self.history_capacity == 0 {
            return Err(AutosaveError::Config(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.validation_cache_size == 0 {
            return Err(AutosaveError::Config(
                "validation_cache_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AutosaveConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_history_capacity_rejected() {
        let config = AutosaveConfig {
            history_capacity: 0,
            ..Default::default()
        };
        let error = config.validate().unwrap_err();
        assert_eq!(error.code(), "CONFIG_ERROR");
    }

    #[test]
    fn oversized_debounce_rejected() {
        let config = AutosaveConfig {
            debounce_ms: 3_600_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
