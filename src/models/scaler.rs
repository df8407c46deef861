// Feature normalization transform (per-feature mean and scale)

use anyhow::{bail, Context, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Standard scaler fitted once at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl FeatureScaler {
    /// Fit on a (rows x features) matrix. Population standard deviation;
    /// constant columns get a scale of 1.0 so they pass through centred.
    pub fn fit(data: &Array2<f32>) -> Result<Self> {
        if data.nrows() == 0 {
            bail!("Cannot fit scaler on an empty dataset");
        }

        let n = data.nrows() as f64;
        let mut mean = Vec::with_capacity(data.ncols());
        let mut scale = Vec::with_capacity(data.ncols());

        for column in data.axis_iter(Axis(1)) {
            let m = column.iter().map(|&v| v as f64).sum::<f64>() / n;
            let var = column.iter().map(|&v| (v as f64 - m).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std > f64::EPSILON { std } else { 1.0 });
        }

        Ok(Self { mean, scale })
    }

    pub fn num_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, features: &[f32]) -> Result<Vec<f32>> {
        if features.len() != self.num_features() {
            bail!(
                "Scaler expects {} features, got {}",
                self.num_features(),
                features.len()
            );
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&x, (&m, &s))| ((x as f64 - m) / s) as f32)
            .collect())
    }

    pub fn transform_batch(&self, data: &Array2<f32>) -> Result<Array2<f32>> {
        if data.ncols() != self.num_features() {
            bail!(
                "Scaler expects {} features, got {}",
                self.num_features(),
                data.ncols()
            );
        }
        let mut out = data.clone();
        for (mut column, (&m, &s)) in out
            .axis_iter_mut(Axis(1))
            .zip(self.mean.iter().zip(&self.scale))
        {
            column.mapv_inplace(|x| ((x as f64 - m) / s) as f32);
        }
        Ok(out)
    }

    /// Reject mismatched vectors and non-positive or non-finite scales
    pub fn check(&self) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            bail!(
                "Scaler has {} means but {} scales",
                self.mean.len(),
                self.scale.len()
            );
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            bail!("Scaler mean contains non-finite values");
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            bail!("Scaler scale must be finite and positive");
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scaler: {}", path.display()))?;
        let scaler: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse scaler: {}", path.display()))?;
        scaler.check()?;
        Ok(scaler)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize scaler")
    }
}
