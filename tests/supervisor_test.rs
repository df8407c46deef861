// Integration tests for the retraining supervisor against a real CSV log
// and the real MlpTrainer.

use nudge::config::TrainerConfig;
use nudge::dataset::{CsvDatasetSource, DatasetSource};
use nudge::inference::{FeatureVector, Predictor};
use nudge::models::{Architecture, MlpTrainer, RollbackOutcome, TrainingConfig};
use nudge::training::{CycleFailure, CycleOutcome, RetrainSupervisor, TickOutcome, TrainerState};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const HEADER: &str = "foreground_app,idle_time,time_last_request,productive";

/// Append `rows` labeled rows; short idle time means productive
fn append_rows(path: &Path, start: usize, rows: usize) {
    let fresh = !path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    if fresh {
        writeln!(file, "{}", HEADER).unwrap();
    }
    for i in start..start + rows {
        let productive = i % 2 == 0;
        let idle = if productive { 200 + (i % 7) * 50 } else { 20000 + (i % 11) * 900 };
        writeln!(
            file,
            "{},{},{},{}",
            1000 + (i % 5) * 3000,
            idle,
            5000 + (i % 13) * 1000,
            u8::from(productive)
        )
        .unwrap();
    }
}

struct Fixture {
    _temp_dir: TempDir,
    csv: PathBuf,
    config: TrainerConfig,
}

impl Fixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let csv = temp_dir.path().join("HARVEST.CSV");
        let config = TrainerConfig {
            csv_path: csv.clone(),
            model_dir: temp_dir.path().join("model"),
            min_new_samples: 50,
            min_total_samples: 100,
            check_interval_secs: 3600,
            architecture: Architecture::Lightweight,
        };
        Self {
            _temp_dir: temp_dir,
            csv,
            config,
        }
    }

    fn supervisor(&self) -> RetrainSupervisor {
        let mut training = TrainingConfig::unattended(Architecture::Lightweight);
        training.max_epochs = 40;
        RetrainSupervisor::new(
            &self.config,
            Arc::new(CsvDatasetSource::new(&self.csv)),
            Arc::new(MlpTrainer),
        )
        .unwrap()
        .with_training_config(training)
    }
}

#[test]
fn test_waits_for_log_then_initial_threshold() {
    let fixture = Fixture::new();
    let mut supervisor = fixture.supervisor();

    assert_eq!(supervisor.tick().unwrap(), TickOutcome::DatasetMissing);

    append_rows(&fixture.csv, 0, 99);
    assert!(matches!(supervisor.tick().unwrap(), TickOutcome::Waiting(_)));
    assert!(!supervisor.store().has_current());

    append_rows(&fixture.csv, 99, 1);
    match supervisor.tick().unwrap() {
        TickOutcome::Trained(CycleOutcome::Committed {
            training_count,
            samples,
            ..
        }) => {
            assert_eq!(training_count, 1);
            assert_eq!(samples, 100);
        }
        other => panic!("expected a committed cycle, got {:?}", other),
    }

    let store = supervisor.store();
    assert!(store.model_path().is_file());
    assert!(store.scaler_path().is_file());
    assert!(!store.backup_model_path().exists());
}

#[test]
fn test_incremental_retrain_keeps_backup() {
    let fixture = Fixture::new();
    append_rows(&fixture.csv, 0, 120);
    let mut supervisor = fixture.supervisor();
    supervisor.tick().unwrap();
    let first_model = std::fs::read(supervisor.store().model_path()).unwrap();

    append_rows(&fixture.csv, 120, 49);
    assert!(matches!(supervisor.tick().unwrap(), TickOutcome::Waiting(_)));

    append_rows(&fixture.csv, 169, 1);
    assert!(matches!(
        supervisor.tick().unwrap(),
        TickOutcome::Trained(CycleOutcome::Committed {
            training_count: 2,
            samples: 170,
            ..
        })
    ));
    assert_eq!(
        std::fs::read(supervisor.store().backup_model_path()).unwrap(),
        first_model
    );
}

#[test]
fn test_unusable_log_rolls_back_and_keeps_state() {
    let fixture = Fixture::new();
    append_rows(&fixture.csv, 0, 100);
    let mut supervisor = fixture.supervisor();
    supervisor.tick().unwrap();
    let model_before = std::fs::read(supervisor.store().model_path()).unwrap();
    let state_before = supervisor.state().clone();

    // Enough rows to trigger, none of them usable for training
    let mut lines = String::from(HEADER);
    lines.push('\n');
    for _ in 0..160 {
        lines.push_str("x,y,z,1\n");
    }
    std::fs::write(&fixture.csv, lines).unwrap();

    match supervisor.tick().unwrap() {
        TickOutcome::Trained(CycleOutcome::RolledBack { cause, rollback }) => {
            assert!(matches!(cause, CycleFailure::TrainerFailed(_)));
            assert_eq!(rollback, RollbackOutcome::Restored);
        }
        other => panic!("expected rollback, got {:?}", other),
    }

    assert_eq!(std::fs::read(supervisor.store().model_path()).unwrap(), model_before);
    assert_eq!(supervisor.state(), &state_before);
    assert_eq!(
        TrainerState::load(supervisor.store().state_path()).unwrap(),
        state_before
    );
}

#[test]
fn test_trained_model_is_servable() {
    let fixture = Fixture::new();
    append_rows(&fixture.csv, 0, 200);
    let mut supervisor = fixture.supervisor();
    supervisor.tick().unwrap();

    let predictor = Predictor::load(&fixture.config.model_dir);
    assert!(predictor.is_loaded());
    assert!(predictor
        .predict(&FeatureVector {
            foreground_app: 12345.0,
            idle_time: 1000.0,
            time_last_request: 30000.0,
            ..Default::default()
        })
        .is_available());
}

#[test]
fn test_row_count_excludes_header() {
    let fixture = Fixture::new();
    append_rows(&fixture.csv, 0, 10);
    let source = CsvDatasetSource::new(&fixture.csv);
    assert_eq!(source.row_count().unwrap(), 10);
    assert_eq!(source.read_all().unwrap().len(), 10);
}

#[tokio::test]
async fn test_run_loop_trains_and_persists_on_cancel() {
    let fixture = Fixture::new();
    append_rows(&fixture.csv, 0, 100);
    let supervisor = fixture.supervisor();
    let state_path = supervisor.store().state_path();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(supervisor.run(cancel.clone()));

    for _ in 0..500 {
        if state_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cancel.cancel();

    let state = tokio::time::timeout(Duration::from_secs(30), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(state.training_count, 1);
    assert_eq!(state.last_trained_samples, 100);
    assert_eq!(TrainerState::load(&state_path).unwrap(), state);
}
