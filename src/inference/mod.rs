// Inference - turning a loaded model into per-request predictions

mod predictor;

pub use predictor::{
    FeatureVector, Prediction, Predictor, REASON_FEATURE_MISMATCH, REASON_NO_MODEL,
    REASON_PREDICTION_FAILED,
};
