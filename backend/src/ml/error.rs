//! Errors raised by the model pipeline

use shared::FeatureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MlError {
    #[error("Insufficient training data: {0}")]
    InsufficientTrainingData(String),

    #[error("Feature schema drift: {0}")]
    SchemaDrift(String),

    #[error(transparent)]
    Category(#[from] FeatureError),

    #[error("Artifact load failed: {0}")]
    ArtifactLoad(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Estimator error: {0}")]
    Estimator(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<smartcore::error::Failed> for MlError {
    fn from(err: smartcore::error::Failed) -> Self {
        MlError::Estimator(err.to_string())
    }
}
