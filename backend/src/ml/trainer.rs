//! Model training
//!
//! Turns labelled samples into an immutable [`ModelArtifact`]: validate,
//! freeze the categorical encoder, split, standardize on the training split,
//! optionally search hyperparameters, cross-validate, fit the final forest
//! and score it on the held-out split. Feature importances are permutation
//! importances on that split.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{model_feature_names, CategoricalEncoder, FeatureImportance, ModelMetrics, SplitStrategy};

use super::artifact::{ModelArtifact, ARTIFACT_FORMAT_VERSION};
use super::dataset::{split_indices, to_matrix, TrainingSample};
use super::error::MlError;
use super::forest::{ForestParams, RandomForestRegressor};
use super::metrics::{cross_val_mae, mae, r2, rmse};
use super::scaler::FeatureScaler;
use super::search::{randomized_search, SearchSpace};

/// Randomized search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    pub iterations: usize,
    pub folds: usize,
    #[serde(default)]
    pub space: SearchSpace,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            iterations: 20,
            folds: 3,
            space: SearchSpace::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub min_samples: usize,
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub split: SplitStrategy,
    pub forest: ForestParams,
    /// `None` trains with `forest` as given
    pub search: Option<SearchSettings>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            min_samples: 50,
            test_fraction: 0.2,
            cv_folds: 5,
            split: SplitStrategy::Random,
            forest: ForestParams::default(),
            search: None,
        }
    }
}

impl TrainerConfig {
    fn validate(&self) -> Result<(), MlError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(MlError::InvalidConfig(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.cv_folds < 2 {
            return Err(MlError::InvalidConfig("cv_folds must be at least 2".into()));
        }
        if let Some(search) = &self.search {
            if search.folds < 2 || search.iterations == 0 {
                return Err(MlError::InvalidConfig(
                    "search needs at least one iteration and two folds".into(),
                ));
            }
        }
        self.forest.validate()
    }
}

/// Trains yield models
#[derive(Debug, Clone, Default)]
pub struct ModelTrainer {
    config: TrainerConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train a model and stamp it with `version`.
    ///
    /// Fails with `InsufficientTrainingData` for too few samples or a
    /// constant target; nothing is persisted here.
    pub fn train(
        &self,
        samples: &[TrainingSample],
        version: &semver::Version,
    ) -> Result<ModelArtifact, MlError> {
        self.config.validate()?;
        check_samples(samples, self.config.min_samples)?;

        let mut encoder = CategoricalEncoder::standard();
        for sample in samples {
            encoder.learn(&sample.context);
        }
        let (x, y) = to_matrix(samples, &encoder)?;

        let (train_idx, test_idx) = split_indices(
            samples,
            self.config.split,
            self.config.test_fraction,
            self.config.forest.seed,
        );
        let pick_rows = |idx: &[usize]| idx.iter().map(|&i| x[i].clone()).collect::<Vec<_>>();
        let pick_targets = |idx: &[usize]| idx.iter().map(|&i| y[i]).collect::<Vec<_>>();
        let (x_train_raw, y_train) = (pick_rows(&train_idx), pick_targets(&train_idx));
        let (x_test_raw, y_test) = (pick_rows(&test_idx), pick_targets(&test_idx));

        let scaler = FeatureScaler::fit(&x_train_raw)?;
        let x_train = scaler.transform(&x_train_raw)?;
        let x_test = scaler.transform(&x_test_raw)?;

        let params = match &self.config.search {
            Some(search) => {
                randomized_search(
                    &x_train,
                    &y_train,
                    &self.config.forest,
                    &search.space,
                    search.iterations,
                    search.folds,
                )?
                .best
                .params
            }
            None => self.config.forest,
        };

        let cv_mae = cross_val_mae(&x_train, &y_train, &params, self.config.cv_folds)?;
        let forest = RandomForestRegressor::fit(&x_train, &y_train, &params)?;

        let predicted = forest.predict_batch(&x_test)?;
        let metrics = ModelMetrics {
            mae: mae(&y_test, &predicted),
            rmse: rmse(&y_test, &predicted),
            r2: r2(&y_test, &predicted),
            cv_mae,
            train_samples: y_train.len(),
            test_samples: y_test.len(),
        };

        let feature_names = model_feature_names();
        let mut feature_importance: Vec<FeatureImportance> = feature_names
            .iter()
            .zip(forest.permutation_importance(&x_test, &y_test, params.seed)?)
            .map(|(name, importance)| FeatureImportance {
                feature: name.clone(),
                importance,
            })
            .collect();
        feature_importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        tracing::info!(
            version = %version,
            mae = metrics.mae,
            rmse = metrics.rmse,
            r2 = metrics.r2,
            cv_mae = metrics.cv_mae,
            trees = forest.n_trees(),
            "Model trained"
        );

        Ok(ModelArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            version: version.clone(),
            created_at: Utc::now(),
            feature_names,
            encoder,
            scaler,
            forest,
            metrics,
            feature_importance,
            hyperparameters: params,
        })
    }
}

fn check_samples(samples: &[TrainingSample], min_samples: usize) -> Result<(), MlError> {
    if samples.len() < min_samples {
        return Err(MlError::InsufficientTrainingData(format!(
            "{} samples provided, at least {} required",
            samples.len(),
            min_samples
        )));
    }
    if let Some(bad) = samples.iter().find(|s| !s.yield_kg_per_ha.is_finite()) {
        return Err(MlError::InsufficientTrainingData(format!(
            "non-finite yield label {}",
            bad.yield_kg_per_ha
        )));
    }
    let first = samples[0].yield_kg_per_ha;
    if samples.iter().all(|s| (s.yield_kg_per_ha - first).abs() <= f64::EPSILON) {
        return Err(MlError::InsufficientTrainingData(
            "yield labels have zero variance".to_string(),
        ));
    }
    Ok(())
}
