//! Yield model pipeline: dataset handling, synthetic data, random forest
//! training and inference, artifact persistence

pub mod artifact;
pub mod dataset;
pub mod error;
pub mod forest;
pub mod metrics;
pub mod predictor;
pub mod scaler;
pub mod search;
pub mod synthesizer;
pub mod trainer;

pub use artifact::{ArtifactStore, ModelArtifact, StoredArtifact};
pub use dataset::{load_csv, read_csv, TrainingSample};
pub use error::MlError;
pub use forest::{ForestParams, RandomForestRegressor};
pub use predictor::{DegradedDefaults, Predictor};
pub use scaler::FeatureScaler;
pub use synthesizer::{synthesize, SynthesisConfig};
pub use trainer::{ModelTrainer, SearchSettings, TrainerConfig};
