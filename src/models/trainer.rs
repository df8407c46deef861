// Model Trainer - fits the productivity network on the full activity log
//
// Standard-scales every feature, holds out a stratified test split for the
// reported accuracy, and trains with Adam plus early stopping on an inner
// validation split. CPU only; nothing is written to disk here.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info};

use super::network::{Architecture, ModelArtifact};
use super::scaler::FeatureScaler;
use crate::dataset::Dataset;

/// Fewer usable rows than this cannot produce a meaningful split
pub const MIN_TRAINING_ROWS: usize = 20;

/// Knobs for one training run
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub architecture: Architecture,
    pub max_epochs: usize,
    pub learning_rate: f32,
    /// Fraction of rows held out for the reported accuracy
    pub test_fraction: f64,
    /// Fraction of the training rows used for early stopping
    pub validation_fraction: f64,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    pub seed: u64,
    /// Per-epoch progress at info level
    pub log_progress: bool,
}

impl TrainingConfig {
    pub fn new(architecture: Architecture) -> Self {
        Self {
            architecture,
            max_epochs: 150,
            learning_rate: 0.01,
            test_fraction: 0.2,
            validation_fraction: 0.2,
            patience: 15,
            seed: 42,
            log_progress: true,
        }
    }

    /// Configuration for the background supervisor: no progress chatter
    pub fn unattended(architecture: Architecture) -> Self {
        Self {
            log_progress: false,
            ..Self::new(architecture)
        }
    }

    fn batch_size(n_train: usize) -> usize {
        (n_train / 4).clamp(8, 32)
    }
}

/// Everything a successful training run produces
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub artifact: ModelArtifact,
    pub scaler: FeatureScaler,
    /// Accuracy on the held-out split
    pub accuracy: f64,
}

/// Operator-facing verdict on held-out accuracy
pub fn accuracy_rating(accuracy: f64) -> &'static str {
    if accuracy > 0.9 {
        "excellent"
    } else if accuracy > 0.75 {
        "good"
    } else {
        "low - collect more data"
    }
}

/// Capability contract for whatever fits the model
pub trait ModelTrainer: Send + Sync {
    fn train(&self, dataset: &Dataset, config: &TrainingConfig) -> Result<TrainedModel>;
}

/// Dense network trained with mini-batch Adam
#[derive(Debug, Clone, Copy, Default)]
pub struct MlpTrainer;

impl ModelTrainer for MlpTrainer {
    fn train(&self, dataset: &Dataset, config: &TrainingConfig) -> Result<TrainedModel> {
        let start = Instant::now();

        if dataset.len() < MIN_TRAINING_ROWS {
            bail!(
                "Need at least {} examples, have {}",
                MIN_TRAINING_ROWS,
                dataset.len()
            );
        }
        let (productive, unproductive) = dataset.class_counts();
        if productive == 0 || unproductive == 0 {
            bail!("Need both productive AND unproductive examples");
        }

        info!(
            rows = dataset.len(),
            productive = productive,
            unproductive = unproductive,
            architecture = %config.architecture,
            "Training productivity model"
        );

        let n = dataset.len();
        let d = dataset.num_features();
        let flat: Vec<f32> = dataset.features.iter().flatten().copied().collect();
        let raw = Array2::from_shape_vec((n, d), flat).context("Ragged feature rows")?;
        let labels = Array1::from_iter(dataset.labels.iter().map(|&l| l as f32));

        let scaler = FeatureScaler::fit(&raw)?;
        let x = scaler.transform_batch(&raw)?;

        let mut rng = SmallRng::seed_from_u64(config.seed);
        let (train_idx, test_idx) = stratified_split(&dataset.labels, config.test_fraction, &mut rng);

        let mut fit_idx = train_idx.clone();
        fit_idx.shuffle(&mut rng);
        let n_val = (fit_idx.len() as f64 * config.validation_fraction).round() as usize;
        let val_idx = fit_idx.split_off(fit_idx.len() - n_val.min(fit_idx.len() - 1));

        debug!(
            train = fit_idx.len(),
            validation = val_idx.len(),
            test = test_idx.len(),
            "Split dataset"
        );

        let mut model = ModelArtifact::initialize(config.architecture, d, &mut rng);
        let mut adam = Adam::new(&model, config.learning_rate);

        let (x_val, y_val) = if val_idx.is_empty() {
            (x.select(Axis(0), &fit_idx), labels.select(Axis(0), &fit_idx))
        } else {
            (x.select(Axis(0), &val_idx), labels.select(Axis(0), &val_idx))
        };

        let batch_size = TrainingConfig::batch_size(fit_idx.len());
        let mut best = (f32::INFINITY, model.clone());
        let mut stale_epochs = 0usize;
        let mut epochs_run = 0usize;

        for epoch in 1..=config.max_epochs {
            epochs_run = epoch;
            fit_idx.shuffle(&mut rng);

            for batch in fit_idx.chunks(batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb = labels.select(Axis(0), batch);
                let grads = gradients(&model, &xb, &yb)?;
                adam.step(&mut model, &grads);
            }

            let val_loss = bce_loss(&model, &x_val, &y_val)?;
            if config.log_progress && epoch % 10 == 0 {
                info!(epoch = epoch, val_loss = val_loss, "Training progress");
            }

            if val_loss + 1e-6 < best.0 {
                best = (val_loss, model.clone());
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
                if stale_epochs >= config.patience {
                    debug!(epoch = epoch, "Early stopping");
                    break;
                }
            }
        }

        let mut artifact = best.1;
        let eval_idx = if test_idx.is_empty() { &train_idx } else { &test_idx };
        let accuracy = accuracy(
            &artifact,
            &x.select(Axis(0), eval_idx),
            &labels.select(Axis(0), eval_idx),
        )?;

        artifact.accuracy = Some(accuracy);
        artifact.trained_at = Utc::now();

        info!(
            accuracy = accuracy,
            epochs = epochs_run,
            parameters = artifact.parameter_count(),
            best_val_loss = best.0,
            duration_secs = start.elapsed().as_secs_f64(),
            "Training finished"
        );

        Ok(TrainedModel {
            artifact,
            scaler,
            accuracy,
        })
    }
}

/// Per-class shuffle, then hold out `fraction` of each class (at least one
/// row of every class stays in training).
fn stratified_split(labels: &[u8], fraction: f64, rng: &mut SmallRng) -> (Vec<usize>, Vec<usize>) {
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [0u8, 1u8] {
        let mut idx: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect();
        idx.shuffle(rng);
        let n_test = ((idx.len() as f64 * fraction).round() as usize).min(idx.len().saturating_sub(1));
        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

struct LayerGrad {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

/// Binary cross-entropy gradients for one batch
fn gradients(model: &ModelArtifact, x: &Array2<f32>, y: &Array1<f32>) -> Result<Vec<LayerGrad>> {
    let pass = model.forward(x)?;
    let n = x.nrows() as f32;
    let output = pass
        .activations
        .last()
        .context("Forward pass produced no output")?;

    let targets = y.view().insert_axis(Axis(1));
    let mut delta = (output - &targets) / n;

    let mut grads = Vec::with_capacity(model.layers.len());
    for l in (0..model.layers.len()).rev() {
        grads.push(LayerGrad {
            weights: delta.t().dot(&pass.activations[l]),
            bias: delta.sum_axis(Axis(0)),
        });
        if l > 0 {
            let relu_grad = pass.pre_activations[l - 1].mapv(|z| if z > 0.0 { 1.0 } else { 0.0 });
            delta = delta.dot(&model.layers[l].weights) * relu_grad;
        }
    }
    grads.reverse();
    Ok(grads)
}

fn bce_loss(model: &ModelArtifact, x: &Array2<f32>, y: &Array1<f32>) -> Result<f32> {
    let probs = model.predict_batch(x)?;
    let total: f32 = probs
        .column(0)
        .iter()
        .zip(y.iter())
        .map(|(&p, &t)| {
            let p = p.clamp(1e-7, 1.0 - 1e-7);
            -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
        })
        .sum();
    Ok(total / y.len().max(1) as f32)
}

fn accuracy(model: &ModelArtifact, x: &Array2<f32>, y: &Array1<f32>) -> Result<f64> {
    let probs = model.predict_batch(x)?;
    let correct = probs
        .column(0)
        .iter()
        .zip(y.iter())
        .filter(|(&p, &t)| (p >= 0.5) == (t >= 0.5))
        .count();
    Ok(correct as f64 / y.len().max(1) as f64)
}

/// Adam optimizer state, one moment pair per layer parameter
struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: i32,
    m: Vec<LayerGrad>,
    v: Vec<LayerGrad>,
}

impl Adam {
    fn new(model: &ModelArtifact, lr: f32) -> Self {
        let zeros = || -> Vec<LayerGrad> {
            model
                .layers
                .iter()
                .map(|l| LayerGrad {
                    weights: Array2::zeros(l.weights.raw_dim()),
                    bias: Array1::zeros(l.bias.raw_dim()),
                })
                .collect()
        };
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            t: 0,
            m: zeros(),
            v: zeros(),
        }
    }

    fn step(&mut self, model: &mut ModelArtifact, grads: &[LayerGrad]) {
        self.t += 1;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.eps);
        let lr_t = self.lr * (1.0 - b2.powi(self.t)).sqrt() / (1.0 - b1.powi(self.t));

        for (((layer, g), m), v) in model
            .layers
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            m.weights.zip_mut_with(&g.weights, |m, &g| *m = b1 * *m + (1.0 - b1) * g);
            v.weights.zip_mut_with(&g.weights, |v, &g| *v = b2 * *v + (1.0 - b2) * g * g);
            m.bias.zip_mut_with(&g.bias, |m, &g| *m = b1 * *m + (1.0 - b1) * g);
            v.bias.zip_mut_with(&g.bias, |v, &g| *v = b2 * *v + (1.0 - b2) * g * g);

            let weight_update = &m.weights / &v.weights.mapv(|v| v.sqrt() + eps) * lr_t;
            let bias_update = &m.bias / &v.bias.mapv(|v| v.sqrt() + eps) * lr_t;
            layer.weights -= &weight_update;
            layer.bias -= &bias_update;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two well-separated clusters: long attention + short idle is productive
    fn separable_dataset(rows: usize) -> Dataset {
        let mut dataset = Dataset {
            feature_names: vec![
                "foreground_app".into(),
                "idle_time".into(),
                "time_last_request".into(),
            ],
            ..Default::default()
        };
        for i in 0..rows {
            let productive = i % 2 == 0;
            let jitter = (i % 7) as f32;
            let row = if productive {
                vec![100.0 + jitter, 500.0 + jitter * 10.0, 60000.0 + jitter * 100.0]
            } else {
                vec![900.0 + jitter, 40000.0 + jitter * 10.0, 2000.0 + jitter * 100.0]
            };
            dataset.features.push(row);
            dataset.labels.push(productive as u8);
        }
        dataset
    }

    #[test]
    fn test_learns_separable_data() {
        let dataset = separable_dataset(120);
        let trained = MlpTrainer
            .train(&dataset, &TrainingConfig::unattended(Architecture::Lightweight))
            .unwrap();

        assert!(trained.accuracy >= 0.9, "accuracy {}", trained.accuracy);
        assert_eq!(trained.artifact.input_dim, 3);
        assert_eq!(trained.scaler.num_features(), 3);
        assert_eq!(trained.artifact.accuracy, Some(trained.accuracy));
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let dataset = separable_dataset(60);
        let config = TrainingConfig::unattended(Architecture::Standard);
        let a = MlpTrainer.train(&dataset, &config).unwrap();
        let b = MlpTrainer.train(&dataset, &config).unwrap();
        assert_eq!(a.artifact.layers, b.artifact.layers);
        assert_eq!(a.accuracy, b.accuracy);
    }

    #[test]
    fn test_too_few_rows_rejected() {
        let dataset = separable_dataset(MIN_TRAINING_ROWS - 1);
        let err = MlpTrainer
            .train(&dataset, &TrainingConfig::unattended(Architecture::Standard))
            .unwrap_err();
        assert!(err.to_string().contains("at least"));
    }

    #[test]
    fn test_single_class_rejected() {
        let mut dataset = separable_dataset(40);
        dataset.labels.iter_mut().for_each(|l| *l = 1);
        assert!(MlpTrainer
            .train(&dataset, &TrainingConfig::unattended(Architecture::Standard))
            .is_err());
    }

    #[test]
    fn test_stratified_split_keeps_both_classes() {
        let labels: Vec<u8> = (0..50).map(|i| (i % 5 == 0) as u8).collect();
        let mut rng = SmallRng::seed_from_u64(42);
        let (train, test) = stratified_split(&labels, 0.2, &mut rng);

        assert_eq!(train.len() + test.len(), 50);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), 2);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 0).count(), 8);
        assert!(train.iter().all(|i| !test.contains(i)));
    }

    #[test]
    fn test_accuracy_rating_thresholds() {
        assert_eq!(accuracy_rating(0.95), "excellent");
        assert_eq!(accuracy_rating(0.9), "good");
        assert_eq!(accuracy_rating(0.8), "good");
        assert_eq!(accuracy_rating(0.75), "low - collect more data");
    }

    #[test]
    fn test_batch_size_bounds() {
        assert_eq!(TrainingConfig::batch_size(10), 8);
        assert_eq!(TrainingConfig::batch_size(80), 20);
        assert_eq!(TrainingConfig::batch_size(1000), 32);
    }
}
