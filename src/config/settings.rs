// Configuration structs

use super::constants::*;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::Architecture;

/// Top-level configuration: one section per long-running process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retraining supervisor settings
    pub trainer: TrainerConfig,
    /// Inference server settings
    pub server: ServerConfig,
}

/// Retraining supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Activity log to watch
    pub csv_path: PathBuf,
    /// Model store directory
    pub model_dir: PathBuf,
    /// New rows required before retraining
    pub min_new_samples: u64,
    /// Rows required before the first training
    pub min_total_samples: u64,
    /// Seconds between polls
    pub check_interval_secs: u64,
    /// Network size used for every training cycle
    pub architecture: Architecture,
}

/// Inference server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Model store directory the predictor loads from at startup
    pub model_dir: PathBuf,
    /// Accept timeout; bounds how long shutdown can go unnoticed
    pub accept_poll_ms: u64,
    /// Connections that send no complete line within this are closed
    pub read_timeout_ms: u64,
    /// Requests longer than this are rejected as malformed
    pub max_request_bytes: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            min_new_samples: DEFAULT_MIN_NEW_SAMPLES,
            min_total_samples: DEFAULT_MIN_TOTAL_SAMPLES,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            architecture: Architecture::Standard,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            accept_poll_ms: DEFAULT_ACCEPT_POLL_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl TrainerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl ServerConfig {
    /// Parsed bind address (e.g. "127.0.0.1:45002")
    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", raw, e))
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Config {
    /// Validate configuration and return helpful errors
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.trainer.min_total_samples == 0 {
            anyhow::bail!("trainer.min_total_samples must be at least 1");
        }
        if self.trainer.min_new_samples == 0 {
            anyhow::bail!("trainer.min_new_samples must be at least 1");
        }
        if self.trainer.check_interval_secs == 0 {
            anyhow::bail!("trainer.check_interval_secs must be at least 1");
        }
        if self.server.accept_poll_ms == 0 {
            anyhow::bail!("server.accept_poll_ms must be at least 1");
        }
        if self.server.read_timeout_ms == 0 {
            anyhow::bail!("server.read_timeout_ms must be at least 1");
        }
        if self.server.max_request_bytes == 0 {
            anyhow::bail!("server.max_request_bytes must be at least 1");
        }
        self.server.bind_address()?;
        Ok(())
    }
}

/// Platform temp dir + HARVEST.CSV, where the harvester appends rows
pub fn default_csv_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_CSV_NAME)
}
