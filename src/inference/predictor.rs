// Predictor - loads the current artifact once and answers feature queries
//
// Loading never fails the caller: when the model directory holds nothing
// usable the predictor stays in the unloaded state and every query answers
// "unavailable" instead of erroring.

use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::constants::{ACTIVITY_FEATURES, BASIC_FEATURES};
use crate::models::{FeatureScaler, ModelArtifact, ModelStore};

/// Reason reported when no model is loaded
pub const REASON_NO_MODEL: &str = "no_model";

/// Reason reported when the request cannot be mapped onto the model's inputs
pub const REASON_FEATURE_MISMATCH: &str = "feature_mismatch";

/// Reason reported when the forward pass itself fails
pub const REASON_PREDICTION_FAILED: &str = "prediction_failed";

/// One query's raw signals. Keyboard and mouse activity are only consulted by
/// models trained on the four-feature layout.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureVector {
    pub foreground_app: f32,
    pub idle_time: f32,
    pub time_last_request: f32,
    pub keyboard_activity: Option<f32>,
    pub mouse_activity: Option<f32>,
}

impl FeatureVector {
    /// Value of one named log column. Device activity falls back to idle time.
    fn column(&self, name: &str) -> Option<f32> {
        match name {
            "foreground_app" => Some(self.foreground_app),
            "idle_time" => Some(self.idle_time),
            "time_last_request" => Some(self.time_last_request),
            "keyboard_activity" => Some(self.keyboard_activity.unwrap_or(self.idle_time)),
            "mouse_activity" => Some(self.mouse_activity.unwrap_or(self.idle_time)),
            _ => None,
        }
    }

    /// Order the signals the way a model with `input_dim` inputs was trained
    pub fn to_model_input(&self, input_dim: usize) -> Option<Vec<f32>> {
        let layout: &[&str] = match input_dim {
            3 => &BASIC_FEATURES,
            4 => &ACTIVITY_FEATURES,
            _ => return None,
        };
        layout.iter().map(|name| self.column(name)).collect()
    }
}

/// Outcome of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Prediction {
    Available {
        /// 1 = productive, 0 = not productive
        prediction: u8,
        /// Distance from the decision boundary scaled to [0, 1]
        confidence: f32,
        probability: f32,
    },
    Unavailable {
        reason: String,
    },
}

impl Prediction {
    fn unavailable(reason: &str) -> Self {
        Prediction::Unavailable {
            reason: reason.to_string(),
        }
    }

    fn failed(reason: &str, cause: &anyhow::Error) -> Self {
        Prediction::Unavailable {
            reason: format!("{}: {}", reason, cause),
        }
    }

    /// Map a probability onto label and confidence
    pub fn from_probability(probability: f32) -> Self {
        Prediction::Available {
            prediction: u8::from(probability >= 0.5),
            confidence: (probability - 0.5).abs() * 2.0,
            probability,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Prediction::Available { .. })
    }
}

#[derive(Debug, Clone)]
enum PredictorState {
    Unloaded,
    Loaded {
        model: ModelArtifact,
        /// `None` runs the model on raw features (degraded mode)
        transform: Option<FeatureScaler>,
    },
}

/// Read-only after construction, so one instance is shared across handlers
#[derive(Debug, Clone)]
pub struct Predictor {
    state: PredictorState,
}

impl Predictor {
    /// Predictor that answers every query with `no_model`
    pub fn unloaded() -> Self {
        Self {
            state: PredictorState::Unloaded,
        }
    }

    /// Build directly from an in-memory model
    pub fn from_parts(model: ModelArtifact, transform: Option<FeatureScaler>) -> Self {
        Self {
            state: PredictorState::Loaded { model, transform },
        }
    }

    /// Load the current artifact and scaler from `model_dir`
    pub fn load(model_dir: &Path) -> Self {
        let store = ModelStore::new(model_dir);
        let model_path = store.model_path();

        if !model_path.is_file() {
            warn!(path = %model_path.display(), "No model found, predictions unavailable until a model is trained and the server restarted");
            return Self::unloaded();
        }

        let model = match store.load_artifact() {
            Ok(model) => model,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to load model");
                return Self::unloaded();
            }
        };

        let transform = match store.load_scaler() {
            Ok(Some(scaler)) if scaler.num_features() == model.input_dim => Some(scaler),
            Ok(Some(scaler)) => {
                error!(
                    scaler_features = scaler.num_features(),
                    model_features = model.input_dim,
                    "Scaler does not match model"
                );
                return Self::unloaded();
            }
            Ok(None) => {
                warn!("No scaler found, predictions will use unscaled features");
                None
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to load scaler");
                return Self::unloaded();
            }
        };

        info!(
            path = %model_path.display(),
            architecture = %model.architecture,
            features = model.input_dim,
            scaled = transform.is_some(),
            "Model loaded"
        );
        Self::from_parts(model, transform)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, PredictorState::Loaded { .. })
    }

    /// Number of inputs the loaded model takes
    pub fn input_dim(&self) -> Option<usize> {
        match &self.state {
            PredictorState::Loaded { model, .. } => Some(model.input_dim),
            PredictorState::Unloaded => None,
        }
    }

    pub fn predict(&self, features: &FeatureVector) -> Prediction {
        let (model, transform) = match &self.state {
            PredictorState::Loaded { model, transform } => (model, transform),
            PredictorState::Unloaded => return Prediction::unavailable(REASON_NO_MODEL),
        };

        let Some(mut input) = features.to_model_input(model.input_dim) else {
            warn!(features = model.input_dim, "Model expects an unsupported feature layout");
            return Prediction::unavailable(REASON_FEATURE_MISMATCH);
        };

        if let Some(scaler) = transform {
            input = match scaler.transform(&input) {
                Ok(scaled) => scaled,
                Err(e) => {
                    warn!(error = %e, "Failed to scale features");
                    return Prediction::failed(REASON_FEATURE_MISMATCH, &e);
                }
            };
        }

        match model.predict_proba(&input) {
            Ok(p) if p.is_finite() => Prediction::from_probability(p),
            Ok(p) => {
                warn!(probability = p, "Model produced a non-finite probability");
                Prediction::unavailable(REASON_PREDICTION_FAILED)
            }
            Err(e) => {
                warn!(error = %e, "Prediction failed");
                Prediction::failed(REASON_PREDICTION_FAILED, &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Architecture, TrainedModel};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn artifact(input_dim: usize) -> ModelArtifact {
        let mut rng = SmallRng::seed_from_u64(5);
        ModelArtifact::initialize(Architecture::Lightweight, input_dim, &mut rng)
    }

    fn sample() -> FeatureVector {
        FeatureVector {
            foreground_app: 12345.0,
            idle_time: 500.0,
            time_last_request: 10000.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_unloaded_reports_no_model() {
        let predictor = Predictor::unloaded();
        assert!(!predictor.is_loaded());
        assert_eq!(
            predictor.predict(&sample()),
            Prediction::Unavailable {
                reason: "no_model".to_string()
            }
        );
    }

    #[test]
    fn test_confidence_mapping() {
        match Prediction::from_probability(0.9) {
            Prediction::Available {
                prediction,
                confidence,
                ..
            } => {
                assert_eq!(prediction, 1);
                assert!((confidence - 0.8).abs() < 1e-6);
            }
            other => panic!("unexpected {:?}", other),
        }
        match Prediction::from_probability(0.2) {
            Prediction::Available {
                prediction,
                confidence,
                ..
            } => {
                assert_eq!(prediction, 0);
                assert!((confidence - 0.6).abs() < 1e-6);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            Prediction::from_probability(0.5),
            Prediction::Available { prediction: 1, .. }
        ));
    }

    #[test]
    fn test_confidence_grows_with_distance_from_boundary() {
        let confidence = |p: f32| match Prediction::from_probability(p) {
            Prediction::Available { confidence, .. } => confidence,
            other => panic!("unexpected {:?}", other),
        };

        let mut previous = 0.0f32;
        for step in 0..=50 {
            let distance = step as f32 / 100.0;
            let above = confidence(0.5 + distance);
            let below = confidence(0.5 - distance);
            for c in [above, below] {
                assert!((0.0..=1.0).contains(&c), "confidence {} at distance {}", c, distance);
                assert!(c >= previous - 1e-6, "confidence fell at distance {}", distance);
            }
            previous = above.min(below);
        }
    }

    #[test]
    fn test_loaded_prediction_is_consistent() {
        let predictor = Predictor::from_parts(artifact(3), None);
        match predictor.predict(&sample()) {
            Prediction::Available {
                prediction,
                confidence,
                probability,
            } => {
                assert!((0.0..=1.0).contains(&probability));
                assert!((0.0..=1.0).contains(&confidence));
                assert_eq!(prediction, u8::from(probability >= 0.5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_four_feature_layout_falls_back_to_idle() {
        let v = sample();
        assert_eq!(v.to_model_input(4), Some(vec![12345.0, 500.0, 500.0, 10000.0]));

        let v = FeatureVector {
            keyboard_activity: Some(20.0),
            mouse_activity: Some(30.0),
            ..sample()
        };
        assert_eq!(v.to_model_input(4), Some(vec![12345.0, 20.0, 30.0, 10000.0]));
        assert_eq!(v.to_model_input(7), None);
    }

    #[test]
    fn test_unsupported_layout_is_unavailable() {
        let predictor = Predictor::from_parts(artifact(5), None);
        assert_eq!(
            predictor.predict(&sample()),
            Prediction::Unavailable {
                reason: REASON_FEATURE_MISMATCH.to_string()
            }
        );
    }

    #[test]
    fn test_load_from_empty_dir_is_unloaded() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!Predictor::load(temp_dir.path()).is_loaded());
    }

    #[test]
    fn test_load_from_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path());
        store
            .write_current(&TrainedModel {
                artifact: artifact(3),
                scaler: FeatureScaler {
                    mean: vec![10000.0, 1000.0, 20000.0],
                    scale: vec![5000.0, 800.0, 9000.0],
                },
                accuracy: 0.9,
            })
            .unwrap();

        let predictor = Predictor::load(temp_dir.path());
        assert!(predictor.is_loaded());
        assert_eq!(predictor.input_dim(), Some(3));
        assert!(predictor.predict(&sample()).is_available());
    }

    #[test]
    fn test_missing_scaler_runs_degraded() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path());
        std::fs::write(store.model_path(), artifact(3).to_json().unwrap()).unwrap();

        let predictor = Predictor::load(temp_dir.path());
        assert!(predictor.is_loaded());
        assert!(predictor.predict(&sample()).is_available());
    }

    #[test]
    fn test_mismatched_scaler_leaves_unloaded() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path());
        store
            .write_current(&TrainedModel {
                artifact: artifact(3),
                scaler: FeatureScaler {
                    mean: vec![0.0; 2],
                    scale: vec![1.0; 2],
                },
                accuracy: 0.9,
            })
            .unwrap();
        assert!(!Predictor::load(temp_dir.path()).is_loaded());
    }

    #[test]
    fn test_corrupt_scaler_leaves_unloaded() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path());
        std::fs::write(store.model_path(), artifact(3).to_json().unwrap()).unwrap();
        std::fs::write(store.scaler_path(), "{ corrupt").unwrap();

        let predictor = Predictor::load(temp_dir.path());
        assert!(!predictor.is_loaded());
        assert_eq!(
            predictor.predict(&sample()),
            Prediction::Unavailable {
                reason: REASON_NO_MODEL.to_string()
            }
        );
    }
}
