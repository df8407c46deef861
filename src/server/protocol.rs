// Wire protocol - one newline-terminated JSON object each way per connection

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

use crate::inference::{FeatureVector, Prediction};

/// Client request; absent fields decode as 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionRequest {
    /// Hash of the foreground application name
    pub foreground_app: i64,
    /// Milliseconds since the last input event
    pub idle_time: i64,
    /// Milliseconds since the previous request
    pub time_last_request: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyboard_activity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mouse_activity: Option<i64>,
}

impl PredictionRequest {
    pub fn new(foreground_app: i64, idle_time: i64, time_last_request: i64) -> Self {
        Self {
            foreground_app,
            idle_time,
            time_last_request,
            ..Default::default()
        }
    }

    pub fn features(&self) -> FeatureVector {
        FeatureVector {
            foreground_app: self.foreground_app as f32,
            idle_time: self.idle_time as f32,
            time_last_request: self.time_last_request as f32,
            keyboard_activity: self.keyboard_activity.map(|v| v as f32),
            mouse_activity: self.mouse_activity.map(|v| v as f32),
        }
    }

    /// Encoded request line, newline included
    pub fn encode(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Server reply. `request_id` is absent only for requests that failed to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// 1 = productive, 0 = not productive, null when unavailable
    pub prediction: Option<u8>,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f32>,
    pub model_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    /// Time spent inside the predictor only, rounded to 0.01 ms
    #[serde(default)]
    pub prediction_time_ms: f64,
}

impl PredictionResponse {
    pub fn from_prediction(prediction: &Prediction, request_id: u64, elapsed: Duration) -> Self {
        let prediction_time_ms = round_ms(elapsed);
        match prediction {
            Prediction::Available {
                prediction,
                confidence,
                probability,
            } => Self {
                prediction: Some(*prediction),
                confidence: *confidence,
                probability: Some(*probability),
                model_available: true,
                reason: None,
                error: None,
                request_id: Some(request_id),
                prediction_time_ms,
            },
            Prediction::Unavailable { reason } => Self {
                prediction: None,
                confidence: 0.0,
                probability: None,
                model_available: false,
                reason: Some(reason.clone()),
                error: None,
                request_id: Some(request_id),
                prediction_time_ms,
            },
        }
    }

    /// Reply for a request that could not be decoded
    pub fn malformed(error: impl Display) -> Self {
        Self {
            prediction: None,
            confidence: 0.0,
            probability: None,
            model_available: false,
            reason: None,
            error: Some(error.to_string()),
            request_id: None,
            prediction_time_ms: 0.0,
        }
    }

    /// Encoded response line, newline included
    pub fn encode(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}
