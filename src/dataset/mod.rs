// Dataset Source - append-only activity log of labeled feature rows
//
// The supervisor only needs two things from the log: how many rows it
// holds right now, and every row at once when a training cycle starts.

mod csv_source;

pub use csv_source::CsvDatasetSource;

use anyhow::Result;

/// Labeled rows read from the activity log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    /// Feature column names in log order (label excluded)
    pub feature_names: Vec<String>,
    /// One feature vector per row
    pub features: Vec<Vec<f32>>,
    /// 0 = not productive, 1 = productive
    pub labels: Vec<u8>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// (productive, not productive)
    pub fn class_counts(&self) -> (usize, usize) {
        let productive = self.labels.iter().filter(|&&l| l == 1).count();
        (productive, self.labels.len() - productive)
    }
}

/// Growing, append-only log of labeled rows
pub trait DatasetSource: Send + Sync {
    /// Whether the log has been created yet
    fn exists(&self) -> bool;

    /// Number of data rows currently in the log (header excluded)
    fn row_count(&self) -> Result<u64>;

    /// Read every usable row
    fn read_all(&self) -> Result<Dataset>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}
