// Trainer State - the supervisor's persisted memory of progress

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::models::write_atomic;

/// Rows consumed and cycles completed, surviving restarts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerState {
    /// Row count of the activity log at the last successful commit
    #[serde(default)]
    pub last_trained_samples: u64,
    /// Successful training cycles so far
    #[serde(default)]
    pub training_count: u64,
    #[serde(default)]
    pub last_training_time: Option<DateTime<Utc>>,
}

impl TrainerState {
    /// State after one more successful cycle. Rows consumed never move
    /// backwards, even if the log was truncated in between.
    pub fn committed(&self, rows_at_commit: u64) -> Self {
        Self {
            last_trained_samples: self.last_trained_samples.max(rows_at_commit),
            training_count: self.training_count + 1,
            last_training_time: Some(Utc::now()),
        }
    }

    /// Load from disk; a missing or unreadable file starts from scratch
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }

        match Self::load(path) {
            Ok(state) => {
                info!(
                    trainings = state.training_count,
                    samples_seen = state.last_trained_samples,
                    "Loaded trainer state"
                );
                state
            }
            Err(e) => {
                warn!(error = %e, "Could not load trainer state, starting fresh");
                Self::default()
            }
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trainer state: {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse trainer state: {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize trainer state")?;
        write_atomic(path, json.as_bytes())
    }
}
