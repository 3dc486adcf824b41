//! Prediction models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::{FeatureField, FeatureVector};
use crate::models::FeatureImportance;
use crate::recommendation::Recommendation;

/// Model version reported while no trained model is loaded
pub const UNTRAINED_MODEL_VERSION: &str = "untrained";

/// How a prediction's confidence was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceMethod {
    /// Spread of the individual tree predictions
    Ensemble,
    /// Share of inputs that were actually supplied
    Completeness,
    /// Fixed value used in degraded mode
    Default,
}

/// Output of the predictor for one set of readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldPrediction {
    pub predicted_yield_kg_per_ha: f64,
    /// In [0, 1]
    pub confidence: f64,
    pub confidence_method: ConfidenceMethod,
    pub model_version: String,
    pub is_trained: bool,
    pub feature_importance: Vec<FeatureImportance>,
    /// Normalized inputs the prediction was made from
    pub features: FeatureVector,
    pub defaulted_fields: Vec<FeatureField>,
    pub completeness: f64,
}

/// Persisted prediction, append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub farm_id: String,
    pub model_version: String,
    pub features: FeatureVector,
    pub predicted_yield_kg_per_ha: f64,
    pub confidence: f64,
    pub is_trained: bool,
    pub recommendations: Vec<Recommendation>,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn from_prediction(
        farm_id: &str,
        prediction: &YieldPrediction,
        recommendations: Vec<Recommendation>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            farm_id: farm_id.to_string(),
            model_version: prediction.model_version.clone(),
            features: prediction.features,
            predicted_yield_kg_per_ha: prediction.predicted_yield_kg_per_ha,
            confidence: prediction.confidence,
            is_trained: prediction.is_trained,
            recommendations,
            created_at: Utc::now(),
        }
    }
}
