// Validation gate - cheap structural check of a freshly written artifact
//
// Loads the artifact back from disk, independent of the trainer's in-memory
// copy, and pushes one fixed probe through it. Catches corrupt writes and
// broken outputs; says nothing about accuracy.

use ndarray::Array2;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::models::ModelStore;

/// Fixed probe values: app hash, device idle durations, attention span
const PROBE_APP_HASH: f32 = 12345.0;
const PROBE_IDLE_MS: f32 = 1000.0;
const PROBE_ATTENTION_MS: f32 = 30000.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("model file not found: {0}")]
    MissingArtifact(PathBuf),
    #[error("model failed to load: {0}")]
    LoadFailed(String),
    #[error("scaler does not match model: {0}")]
    ScalerMismatch(String),
    #[error("probe prediction failed: {0}")]
    PredictionFailed(String),
    #[error("invalid prediction shape {0:?}, expected [1, 1]")]
    BadShape(Vec<usize>),
    #[error("prediction out of range: {0}")]
    OutOfRange(f32),
}

/// Probe vector for a model with `input_dim` features
pub fn probe_input(input_dim: usize) -> Vec<f32> {
    (0..input_dim)
        .map(|i| {
            if i == 0 {
                PROBE_APP_HASH
            } else if i == input_dim - 1 {
                PROBE_ATTENTION_MS
            } else {
                PROBE_IDLE_MS
            }
        })
        .collect()
}

/// Validate the store's current artifact; returns the probe probability
pub fn validate_current(store: &ModelStore) -> Result<f32, ValidationError> {
    let model_path = store.model_path();
    if !model_path.is_file() {
        return Err(ValidationError::MissingArtifact(model_path));
    }

    let artifact = store
        .load_artifact()
        .map_err(|e| ValidationError::LoadFailed(format!("{:#}", e)))?;

    let mut probe = probe_input(artifact.input_dim);
    match store.load_scaler() {
        Ok(Some(scaler)) => {
            probe = scaler
                .transform(&probe)
                .map_err(|e| ValidationError::ScalerMismatch(e.to_string()))?;
        }
        Ok(None) => {}
        Err(e) => return Err(ValidationError::ScalerMismatch(format!("{:#}", e))),
    }

    let input = Array2::from_shape_vec((1, probe.len()), probe)
        .map_err(|e| ValidationError::PredictionFailed(e.to_string()))?;
    let output = artifact
        .predict_batch(&input)
        .map_err(|e| ValidationError::PredictionFailed(e.to_string()))?;

    if output.shape() != [1, 1] {
        return Err(ValidationError::BadShape(output.shape().to_vec()));
    }

    let probability = output[[0, 0]];
    // NaN fails the range check as well.
    if !(0.0..=1.0).contains(&probability) {
        return Err(ValidationError::OutOfRange(probability));
    }

    info!(probe_probability = probability, "Model validation passed");
    Ok(probability)
}
