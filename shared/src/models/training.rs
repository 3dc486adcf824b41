//! Model training records

use serde::{Deserialize, Serialize};

/// Held-out and cross-validated regression metrics, in kg/ha where applicable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    /// Mean absolute error averaged over the k folds of the training split
    pub cv_mae: f64,
    pub train_samples: usize,
    pub test_samples: usize,
}

/// Share of held-out error attributable to one input, from permutation importance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// How the train/test partition is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Seeded shuffle
    #[default]
    Random,
    /// Most recent observations held out
    Chronological,
}

impl std::str::FromStr for SplitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(SplitStrategy::Random),
            "chronological" | "time" => Ok(SplitStrategy::Chronological),
            other => Err(format!("unknown split strategy '{}'", other)),
        }
    }
}
