// Models module
//
// The servable artifact (a small dense network plus its feature scaler),
// the trainer that produces it, and the on-disk store both sides share.

pub mod network;
pub mod scaler;
pub mod store;
pub mod trainer;

pub use network::{Architecture, DenseLayer, ModelArtifact};
pub use scaler::FeatureScaler;
pub use store::{write_atomic, BackupOutcome, ModelStore, RollbackOutcome};
pub use trainer::{
    accuracy_rating, MlpTrainer, ModelTrainer, TrainedModel, TrainingConfig,
    MIN_TRAINING_ROWS,
};
