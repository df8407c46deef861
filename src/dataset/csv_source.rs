// CSV-backed activity log
//
// Header names the columns. `productive` is the label. Features are picked by
// name into one of the two layouts the predictor understands, preferring the
// device-activity layout; any other column is ignored.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::debug;

use super::{Dataset, DatasetSource};
use crate::config::constants::{ACTIVITY_FEATURES, BASIC_FEATURES, LABEL_COLUMN};

/// Activity log stored as CSV on disk
#[derive(Debug, Clone)]
pub struct CsvDatasetSource {
    path: PathBuf,
}

impl CsvDatasetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn reader(&self) -> Result<csv::Reader<std::fs::File>> {
        csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open activity log: {}", self.path.display()))
    }
}

impl DatasetSource for CsvDatasetSource {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn row_count(&self) -> Result<u64> {
        if !self.exists() {
            return Ok(0);
        }

        let mut reader = self.reader()?;
        let mut count = 0u64;
        let mut record = csv::ByteRecord::new();
        while reader
            .read_byte_record(&mut record)
            .with_context(|| format!("Failed to count rows in {}", self.path.display()))?
        {
            count += 1;
        }
        Ok(count)
    }

    fn read_all(&self) -> Result<Dataset> {
        let mut reader = self.reader()?;
        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", self.path.display()))?
            .clone();

        let label_idx = match headers.iter().position(|h| h == LABEL_COLUMN) {
            Some(idx) => idx,
            None => bail!(
                "Activity log {} has no '{}' column",
                self.path.display(),
                LABEL_COLUMN
            ),
        };
        let (layout, feature_idx) = match column_indices(&headers, &ACTIVITY_FEATURES) {
            Some(idx) => (&ACTIVITY_FEATURES[..], idx),
            None => match column_indices(&headers, &BASIC_FEATURES) {
                Some(idx) => (&BASIC_FEATURES[..], idx),
                None => bail!(
                    "Activity log {} needs columns {} or {}",
                    self.path.display(),
                    BASIC_FEATURES.join(","),
                    ACTIVITY_FEATURES.join(",")
                ),
            },
        };

        let mut dataset = Dataset {
            feature_names: layout.iter().map(|name| name.to_string()).collect(),
            ..Default::default()
        };

        let mut dropped = 0usize;
        for (line, record) in reader.records().enumerate() {
            let record = record
                .with_context(|| format!("Failed to read row {} of {}", line + 1, self.path.display()))?;

            let label = match record.get(label_idx).map(str::parse::<u8>) {
                Some(Ok(l @ (0 | 1))) => l,
                _ => {
                    dropped += 1;
                    continue;
                }
            };

            let row: Option<Vec<f32>> = feature_idx
                .iter()
                .map(|&i| record.get(i).and_then(|v| v.parse::<f64>().ok()).map(|v| v as f32))
                .collect();

            match row {
                Some(row) => {
                    dataset.features.push(row);
                    dataset.labels.push(label);
                }
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!(dropped = dropped, kept = dataset.len(), "Dropped incomplete rows");
        }

        Ok(dataset)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Header position of every name in `layout`, or `None` if any is missing
fn column_indices(headers: &csv::StringRecord, layout: &[&str]) -> Option<Vec<usize>> {
    layout
        .iter()
        .map(|name| headers.iter().position(|h| h == *name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_counts_zero() {
        let temp_dir = TempDir::new().unwrap();
        let source = CsvDatasetSource::new(temp_dir.path().join("HARVEST.CSV"));
        assert!(!source.exists());
        assert_eq!(source.row_count().unwrap(), 0);
        assert!(source.read_all().is_err());
    }

    #[test]
    fn test_row_count_excludes_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("HARVEST.CSV");
        fs::write(
            &path,
            "foreground_app,idle_time,time_last_request,productive\n1,2,3,1\n4,5,6,0\n",
        )
        .unwrap();

        let source = CsvDatasetSource::new(&path);
        assert!(source.exists());
        assert_eq!(source.row_count().unwrap(), 2);
    }

    #[test]
    fn test_read_all_drops_incomplete_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("HARVEST.CSV");
        fs::write(
            &path,
            "foreground_app,keyboard_activity,mouse_activity,time_last_request,productive\n\
             -17,100,200,3000,1\n\
             5,,200,3000,0\n\
             6,10,20,30,7\n\
             8,10,20,30,0\n",
        )
        .unwrap();

        let dataset = CsvDatasetSource::new(&path).read_all().unwrap();
        assert_eq!(dataset.num_features(), 4);
        assert_eq!(dataset.feature_names[3], "time_last_request");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.features[0], vec![-17.0, 100.0, 200.0, 3000.0]);
        assert_eq!(dataset.labels, vec![1, 0]);
    }

    #[test]
    fn test_features_selected_by_name() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("HARVEST.CSV");
        fs::write(
            &path,
            "timestamp,idle_time,productive,time_last_request,foreground_app\n\
             1700000000,1000,1,30000,12345\n",
        )
        .unwrap();

        let dataset = CsvDatasetSource::new(&path).read_all().unwrap();
        assert_eq!(
            dataset.feature_names,
            vec!["foreground_app", "idle_time", "time_last_request"]
        );
        assert_eq!(dataset.features[0], vec![12345.0, 1000.0, 30000.0]);
        assert_eq!(dataset.labels, vec![1]);
    }

    #[test]
    fn test_unknown_feature_layout_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("HARVEST.CSV");
        fs::write(&path, "foreground_app,cpu_load,productive\n1,2,1\n").unwrap();
        assert!(CsvDatasetSource::new(&path).read_all().is_err());
    }

    #[test]
    fn test_missing_label_column_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("HARVEST.CSV");
        fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(CsvDatasetSource::new(&path).read_all().is_err());
    }
}
