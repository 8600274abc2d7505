//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, WatchError, WatchResult};

/// Category stamped on every notification request the engine schedules.
pub const DEFAULT_CATEGORY: &str = "regionwatch";

/// When the engine masks an `Always` predicate it has delivered to a live consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPolicy {
    /// Mask before emission; unmask when the consumer drops the emitted item.
    #[default]
    UntilHandled,
    /// Mask before emission; unmask when the session is torn down.
    WhileActive,
    /// Never mask on the consumer's behalf.
    Disabled,
}

/// Reconciliation engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-session output buffer. Emissions beyond it are dropped and counted.
    pub stream_capacity: usize,
    /// Max queued control messages (teardown requests).
    pub control_queue_capacity: usize,
    /// Category of owned notification requests.
    pub category_identifier: String,
    /// Masking behavior for live deliveries.
    pub mask_policy: MaskPolicy,
    /// Release owned registrations the new desired set does not need.
    pub prune_stale: bool,
    /// How long an explicit cancel waits for the session worker.
    pub teardown_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_capacity: 1024,
            control_queue_capacity: 64,
            category_identifier: DEFAULT_CATEGORY.to_string(),
            mask_policy: MaskPolicy::UntilHandled,
            prune_stale: true,
            teardown_timeout_ms: 2000,
        }
    }
}

impl EngineConfig {
    /// Checks the invariants the engine relies on.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for zero capacities or a blank category.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stream_capacity == 0 {
            return Err(invalid("stream_capacity must be at least 1"));
        }
        if self.control_queue_capacity == 0 {
            return Err(invalid("control_queue_capacity must be at least 1"));
        }
        if self.category_identifier.trim().is_empty() {
            return Err(invalid("category_identifier cannot be empty"));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration; missing fields take defaults.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the JSON is malformed or fails validation.
    pub fn from_json_str(json: &str) -> WatchResult<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| invalid(format!("malformed configuration: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> WatchResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WatchError::from(invalid(format!("cannot read {}: {e}", path.display())))
        })?;
        Self::from_json_str(&raw)
    }
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        reason: reason.into(),
    }
}
