//! Business logic services for the Agri-Siddhi yield service

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::ml::Predictor;

pub mod optimization;
pub mod prediction;
pub mod registry;
pub mod training;

pub use optimization::OptimizationEngine;
pub use prediction::{
    adopt_latest_artifact, load_active_predictor, InMemoryPredictionStore, PgPredictionStore, PredictionService, PredictionStore,
};
pub use registry::{InMemoryModelRegistry, ModelRegistry, ModelVersion, PgModelRegistry};
pub use training::TrainingService;

/// Active predictor, swapped whole when a new model is activated
pub type SharedPredictor = Arc<RwLock<Arc<Predictor>>>;
