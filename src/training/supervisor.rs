// Retraining Supervisor - polls the activity log and keeps the model fresh
//
// Each tick: wait for the log, count rows, apply the trigger policy, and
// when it fires run one backup -> train -> write -> validate -> commit cycle.
// Any failure inside a cycle rolls the store back and leaves Trainer State
// untouched, so the same rows are reconsidered on the next tick.

use anyhow::{Context, Result};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::policy::{TriggerDecision, TriggerPolicy};
use super::state::TrainerState;
use super::validation::{self, ValidationError};
use crate::config::TrainerConfig;
use crate::dataset::DatasetSource;
use crate::models::{ModelStore, ModelTrainer, RollbackOutcome, TrainingConfig};

/// Why a training cycle was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum CycleFailure {
    /// The freshly written artifact failed the validation gate
    ValidationFailed { cause: ValidationError },
    /// The trainer itself returned an error
    TrainerFailed(String),
    /// Reading the log or writing the store failed
    Io(String),
    /// Something inside the cycle panicked
    Panicked(String),
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleFailure::ValidationFailed { cause } => write!(f, "validation failed: {}", cause),
            CycleFailure::TrainerFailed(msg) => write!(f, "training failed: {}", msg),
            CycleFailure::Io(msg) => write!(f, "I/O error: {}", msg),
            CycleFailure::Panicked(msg) => write!(f, "cycle panicked: {}", msg),
        }
    }
}

/// Result of one training cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Committed {
        training_count: u64,
        samples: u64,
        accuracy: f64,
    },
    RolledBack {
        cause: CycleFailure,
        rollback: RollbackOutcome,
    },
}

/// Result of one polling tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Activity log not created yet
    DatasetMissing,
    /// Log present but the trigger policy said not yet
    Waiting(TriggerDecision),
    Trained(CycleOutcome),
}

/// Owns Trainer State and drives the Model Store
pub struct RetrainSupervisor {
    dataset: Arc<dyn DatasetSource>,
    trainer: Arc<dyn ModelTrainer>,
    store: ModelStore,
    policy: TriggerPolicy,
    training: TrainingConfig,
    check_interval: Duration,
    state: TrainerState,
}

impl RetrainSupervisor {
    /// Create the supervisor, creating the model directory and loading any
    /// persisted state. Directory creation failure is fatal.
    pub fn new(
        config: &TrainerConfig,
        dataset: Arc<dyn DatasetSource>,
        trainer: Arc<dyn ModelTrainer>,
    ) -> Result<Self> {
        let store = ModelStore::new(&config.model_dir);
        store.ensure_dir()?;
        let state = TrainerState::load_or_default(store.state_path());

        Ok(Self {
            dataset,
            trainer,
            store,
            policy: TriggerPolicy::new(config.min_total_samples, config.min_new_samples),
            training: TrainingConfig::unattended(config.architecture),
            check_interval: config.check_interval(),
            state,
        })
    }

    /// Override the training knobs (e.g. fewer epochs)
    pub fn with_training_config(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    /// Override the polling interval
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Apply the trigger policy to the current row count, logging the verdict
    pub fn should_train(&self, current_samples: u64) -> TriggerDecision {
        let decision = self.policy.evaluate_state(&self.state, current_samples);
        match decision {
            TriggerDecision::Initial { available } => {
                info!(samples = available, "Sufficient data for initial training");
            }
            TriggerDecision::Incremental { new_samples } => {
                info!(new_samples = new_samples, "Sufficient new data for retraining");
            }
            TriggerDecision::Wait {
                have,
                target,
                needed,
            } => {
                debug!(
                    have = have,
                    target = target,
                    needed = needed,
                    "Waiting for more data"
                );
            }
        }
        decision
    }

    /// Run one full training cycle. On any failure the store is rolled back
    /// and state is left as it was.
    pub fn train_model(&mut self) -> CycleOutcome {
        info!(
            cycle = self.state.training_count + 1,
            architecture = %self.training.architecture,
            "Starting training cycle"
        );

        let backup = self.store.backup_current();

        let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.attempt_cycle()))
            .unwrap_or_else(|payload| Err(CycleFailure::Panicked(panic_message(payload.as_ref()))));

        match attempt {
            Ok((next, accuracy)) => {
                self.state = next;
                info!(
                    training_count = self.state.training_count,
                    samples = self.state.last_trained_samples,
                    accuracy = format!("{:.1}%", accuracy * 100.0),
                    "Training cycle committed"
                );
                CycleOutcome::Committed {
                    training_count: self.state.training_count,
                    samples: self.state.last_trained_samples,
                    accuracy,
                }
            }
            Err(cause) => {
                error!(cause = %cause, "Training cycle failed, rolling back");
                let rollback = self.store.rollback(backup);
                CycleOutcome::RolledBack { cause, rollback }
            }
        }
    }

    /// Train, write, validate, then persist the advanced state. State is only
    /// replaced by the caller once every step has succeeded.
    fn attempt_cycle(&self) -> std::result::Result<(TrainerState, f64), CycleFailure> {
        let dataset = self
            .dataset
            .read_all()
            .map_err(|e| CycleFailure::Io(format!("{:#}", e)))?;

        let trained = self
            .trainer
            .train(&dataset, &self.training)
            .map_err(|e| CycleFailure::TrainerFailed(format!("{:#}", e)))?;

        self.store
            .write_current(&trained)
            .map_err(|e| CycleFailure::Io(format!("{:#}", e)))?;

        validation::validate_current(&self.store)
            .map_err(|cause| CycleFailure::ValidationFailed { cause })?;

        // Count again so rows that arrived mid-training are not retrained on
        // as "new" next time.
        let rows_at_commit = self
            .dataset
            .row_count()
            .map_err(|e| CycleFailure::Io(format!("{:#}", e)))?;

        let next = self.state.committed(rows_at_commit);
        next.save(self.store.state_path())
            .map_err(|e| CycleFailure::Io(format!("{:#}", e)))?;

        Ok((next, trained.accuracy))
    }

    /// One polling step. Errors here are reported to the loop, which logs
    /// them and carries on.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if !self.dataset.exists() {
            info!(path = %self.dataset.describe(), "Waiting for activity log");
            return Ok(TickOutcome::DatasetMissing);
        }

        let current = self
            .dataset
            .row_count()
            .context("Failed to count activity log rows")?;

        let decision = self.should_train(current);
        if !decision.should_train() {
            return Ok(TickOutcome::Waiting(decision));
        }

        Ok(TickOutcome::Trained(self.train_model()))
    }

    /// Poll until `cancel` fires. A cycle in progress always runs to
    /// completion before cancellation is observed. Returns the final state.
    pub async fn run(self, cancel: CancellationToken) -> Result<TrainerState> {
        info!(
            csv = %self.dataset.describe(),
            model_dir = %self.store.dir().display(),
            min_new_samples = self.policy.min_new_samples,
            min_total_samples = self.policy.min_total_samples,
            check_interval_secs = self.check_interval.as_secs(),
            architecture = %self.training.architecture,
            "Background trainer started"
        );

        let interval = self.check_interval;
        let mut supervisor = self;

        while !cancel.is_cancelled() {
            let (returned, outcome) = tokio::task::spawn_blocking(move || {
                let mut supervisor = supervisor;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| supervisor.tick()))
                    .unwrap_or_else(|payload| {
                        Err(anyhow::anyhow!("tick panicked: {}", panic_message(payload.as_ref())))
                    });
                (supervisor, outcome)
            })
            .await
            .context("Supervisor tick task was aborted")?;
            supervisor = returned;

            match outcome {
                Ok(TickOutcome::Trained(CycleOutcome::RolledBack { rollback, .. })) => {
                    if rollback == RollbackOutcome::Failed || rollback == RollbackOutcome::Unavailable {
                        warn!(rollback = ?rollback, "Model store could not be fully restored");
                    }
                }
                Ok(_) => {}
                Err(e) => error!(error = %format!("{:#}", e), "Error in training loop"),
            }

            debug!(secs = interval.as_secs(), "Sleeping until next check");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        if let Err(e) = supervisor.shutdown() {
            error!(error = %format!("{:#}", e), "Trainer state not saved on shutdown");
        }
        Ok(supervisor.state)
    }

    /// Persist state one final time
    pub fn shutdown(&self) -> Result<()> {
        info!(
            total_trainings = self.state.training_count,
            last_trained_samples = self.state.last_trained_samples,
            "Shutting down background trainer"
        );
        self.state
            .save(self.store.state_path())
            .context("Failed to persist trainer state on shutdown")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
