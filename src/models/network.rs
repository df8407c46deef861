// Dense productivity network - the serialized model artifact
//
// A small feed-forward network: ReLU hidden layers and one sigmoid output
// unit. Weights live in ndarray matrices and serialize straight to JSON.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Current on-disk artifact format
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Network size presets
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// Fast, low memory: one hidden layer of 8
    Lightweight,
    /// Balanced: two hidden layers of 10
    #[default]
    Standard,
    /// Best accuracy: 16 -> 12 -> 8
    Deep,
}

impl Architecture {
    pub fn hidden_units(&self) -> &'static [usize] {
        match self {
            Architecture::Lightweight => &[8],
            Architecture::Standard => &[10, 10],
            Architecture::Deep => &[16, 12, 8],
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Architecture::Lightweight => "lightweight",
            Architecture::Standard => "standard",
            Architecture::Deep => "deep",
        };
        f.write_str(name)
    }
}

/// One fully connected layer; `weights` is (outputs x inputs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl DenseLayer {
    pub fn inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn outputs(&self) -> usize {
        self.weights.nrows()
    }
}

/// Trained, servable model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub architecture: Architecture,
    pub input_dim: usize,
    pub layers: Vec<DenseLayer>,
    pub trained_at: DateTime<Utc>,
    /// Held-out accuracy recorded by the trainer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// Intermediate values kept for backpropagation
pub(crate) struct ForwardPass {
    /// activations[0] is the input batch, the last entry the output
    pub activations: Vec<Array2<f32>>,
    /// Pre-activation values per layer
    pub pre_activations: Vec<Array2<f32>>,
}

impl ModelArtifact {
    /// Randomly initialised network (He-uniform hidden, Glorot-uniform output)
    pub fn initialize<R: Rng>(
        architecture: Architecture,
        input_dim: usize,
        rng: &mut R,
    ) -> Self {
        let mut layers = Vec::new();
        let mut fan_in = input_dim;
        for &units in architecture.hidden_units() {
            let limit = (6.0 / fan_in as f32).sqrt();
            layers.push(DenseLayer {
                weights: Array2::from_shape_fn((units, fan_in), |_| rng.gen_range(-limit..limit)),
                bias: Array1::zeros(units),
            });
            fan_in = units;
        }

        let limit = (6.0 / (fan_in + 1) as f32).sqrt();
        layers.push(DenseLayer {
            weights: Array2::from_shape_fn((1, fan_in), |_| rng.gen_range(-limit..limit)),
            bias: Array1::zeros(1),
        });

        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            architecture,
            input_dim,
            layers,
            trained_at: Utc::now(),
            accuracy: None,
        }
    }

    /// Check that layer shapes chain from `input_dim` to a single output
    pub fn check_structure(&self) -> Result<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            bail!(
                "Unsupported artifact format version {} (expected {})",
                self.format_version,
                ARTIFACT_FORMAT_VERSION
            );
        }
        if self.layers.is_empty() {
            bail!("Artifact has no layers");
        }

        let mut expected_inputs = self.input_dim;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.inputs() != expected_inputs {
                bail!(
                    "Layer {} expects {} inputs but receives {}",
                    i,
                    layer.inputs(),
                    expected_inputs
                );
            }
            if layer.bias.len() != layer.outputs() {
                bail!(
                    "Layer {} has {} biases for {} outputs",
                    i,
                    layer.bias.len(),
                    layer.outputs()
                );
            }
            expected_inputs = layer.outputs();
        }

        if expected_inputs != 1 {
            bail!("Output layer has {} units (expected 1)", expected_inputs);
        }
        Ok(())
    }

    /// Probabilities for a batch: (rows x input_dim) -> (rows x outputs)
    pub fn predict_batch(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        let pass = self.forward(inputs)?;
        pass.activations
            .into_iter()
            .last()
            .context("Forward pass produced no output")
    }

    /// Probability for a single feature vector
    pub fn predict_proba(&self, features: &[f32]) -> Result<f32> {
        let input = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .context("Failed to shape feature vector")?;
        let output = self.predict_batch(&input)?;
        match output.shape() {
            [1, 1] => Ok(output[[0, 0]]),
            shape => bail!("Unexpected output shape {:?}", shape),
        }
    }

    pub(crate) fn forward(&self, inputs: &Array2<f32>) -> Result<ForwardPass> {
        if inputs.ncols() != self.input_dim {
            bail!(
                "Model expects {} features, got {}",
                self.input_dim,
                inputs.ncols()
            );
        }

        let last = self.layers.len() - 1;
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        activations.push(inputs.clone());

        for (i, layer) in self.layers.iter().enumerate() {
            let z = activations[i].dot(&layer.weights.t()) + &layer.bias;
            let a = if i == last {
                z.mapv(sigmoid)
            } else {
                z.mapv(|v| v.max(0.0))
            };
            pre_activations.push(z);
            activations.push(a);
        }

        Ok(ForwardPass {
            activations,
            pre_activations,
        })
    }

    /// Total trainable parameters
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.len() + l.bias.len())
            .sum()
    }

    /// Load and structurally check an artifact from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact: {}", path.display()))?;
        let artifact: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse model artifact: {}", path.display()))?;
        artifact.check_structure()?;
        Ok(artifact)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize model artifact")
    }
}

pub(crate) fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn artifact(architecture: Architecture) -> ModelArtifact {
        let mut rng = SmallRng::seed_from_u64(7);
        ModelArtifact::initialize(architecture, 3, &mut rng)
    }

    #[test]
    fn test_architecture_shapes() {
        let deep = artifact(Architecture::Deep);
        assert_eq!(deep.layers.len(), 4);
        assert_eq!(deep.layers[0].inputs(), 3);
        assert_eq!(deep.layers[0].outputs(), 16);
        assert_eq!(deep.layers[3].outputs(), 1);
        deep.check_structure().unwrap();

        let light = artifact(Architecture::Lightweight);
        assert_eq!(light.parameter_count(), 3 * 8 + 8 + 8 + 1);
    }

    #[test]
    fn test_predict_proba_in_unit_range() {
        let model = artifact(Architecture::Standard);
        for features in [[0.0, 0.0, 0.0], [12345.0, 1000.0, 30000.0], [-5.0, 1.0e6, 2.0]] {
            let p = model.predict_proba(&features).unwrap();
            assert!((0.0..=1.0).contains(&p), "probability {} out of range", p);
        }
    }

    #[test]
    fn test_wrong_feature_count_is_error() {
        let model = artifact(Architecture::Standard);
        assert!(model.predict_proba(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_batch_output_shape() {
        let model = artifact(Architecture::Lightweight);
        let batch = Array2::zeros((5, 3));
        let out = model.predict_batch(&batch).unwrap();
        assert_eq!(out.shape(), &[5, 1]);
    }

    #[test]
    fn test_broken_chain_rejected() {
        let mut model = artifact(Architecture::Standard);
        model.layers[1].weights = Array2::zeros((10, 4));
        assert!(model.check_structure().is_err());
    }

    #[test]
    fn test_save_load_preserves_predictions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");
        let model = artifact(Architecture::Deep);
        std::fs::write(&path, model.to_json().unwrap()).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        let features = [1.0, 2.0, 3.0];
        assert_eq!(
            loaded.predict_proba(&features).unwrap(),
            model.predict_proba(&features).unwrap()
        );
    }

    #[test]
    fn test_garbage_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");
        std::fs::write(&path, b"\x00\x01not json").unwrap();
        assert!(ModelArtifact::load(&path).is_err());
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(100.0) <= 1.0);
        assert!(sigmoid(-100.0) >= 0.0);
    }
}
