// Project-wide constants
//
// Centralised here so port numbers, file names and trainer thresholds have
// one source of truth. Import via `use crate::config::constants::*;`.

/// Default inference server host (localhost only).
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default inference server port.
pub const DEFAULT_SERVER_PORT: u16 = 45002;

/// Default directory holding the model store.
pub const DEFAULT_MODEL_DIR: &str = "./model";

/// File name of the activity log inside the platform temp directory.
pub const DEFAULT_CSV_NAME: &str = "HARVEST.CSV";

/// New rows required before a retraining is worth its cost.
pub const DEFAULT_MIN_NEW_SAMPLES: u64 = 50;

/// Rows required before the very first training.
pub const DEFAULT_MIN_TOTAL_SAMPLES: u64 = 100;

/// Seconds between supervisor polls of the activity log.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

/// How long the accept loop blocks before re-checking for shutdown.
pub const DEFAULT_ACCEPT_POLL_MS: u64 = 1000;

/// How long a client may take to send its request line.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

/// Upper bound on a single request line.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Number of latency samples retained for the shutdown report.
pub const LATENCY_WINDOW: usize = 100;

/// Model store file names.
pub const MODEL_FILE: &str = "productivity_model.json";
pub const MODEL_BACKUP_FILE: &str = "productivity_model.backup.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const SCALER_BACKUP_FILE: &str = "scaler.backup.json";
pub const STATE_FILE: &str = "trainer_state.json";

/// Name of the label column in the activity log.
pub const LABEL_COLUMN: &str = "productive";

/// Feature columns of the basic activity log, in model input order.
pub const BASIC_FEATURES: [&str; 3] = ["foreground_app", "idle_time", "time_last_request"];

/// Feature columns of the device-activity log, in model input order.
pub const ACTIVITY_FEATURES: [&str; 4] = [
    "foreground_app",
    "keyboard_activity",
    "mouse_activity",
    "time_last_request",
];
