//! Training service
//!
//! Runs one training job at a time. A finished model is saved, registered as
//! the active version and swapped into the shared predictor; requests that
//! already hold the previous predictor finish with it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::{FeatureImportance, ModelMetrics};
use tokio::sync::Mutex;
use validator::Validate;

use super::registry::{ModelRegistry, ModelVersion, NewModelVersion};
use super::SharedPredictor;
use crate::config::MlConfig;
use crate::error::{AppError, AppResult};
use crate::ml::{synthesize, ArtifactStore, ModelTrainer, Predictor, SynthesisConfig, TrainingSample};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TrainInput {
    /// Labelled samples; synthetic data is generated when empty
    #[serde(default)]
    pub samples: Vec<TrainingSample>,
    #[validate(range(min = 1, max = 100000))]
    pub synthetic_samples: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub status: &'static str,
    pub version: String,
    pub metrics: ModelMetrics,
    pub artifact_path: String,
    pub checksum: String,
    pub feature_importance: Vec<FeatureImportance>,
}

#[derive(Clone)]
pub struct TrainingService {
    predictor: SharedPredictor,
    registry: Arc<dyn ModelRegistry>,
    artifacts: ArtifactStore,
    config: Arc<MlConfig>,
    lock: Arc<Mutex<()>>,
}

impl TrainingService {
    pub fn new(
        predictor: SharedPredictor,
        registry: Arc<dyn ModelRegistry>,
        artifacts: ArtifactStore,
        config: MlConfig,
    ) -> Self {
        Self {
            predictor,
            registry,
            artifacts,
            config: Arc::new(config),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn versions(&self) -> AppResult<Vec<ModelVersion>> {
        self.registry.list().await
    }

    pub async fn active_version(&self) -> AppResult<Option<ModelVersion>> {
        self.registry.active().await
    }

    /// Train, persist, register and activate a new model version
    pub async fn train(&self, input: TrainInput) -> AppResult<TrainingOutcome> {
        // Concurrent requests queue here; versions stay strictly increasing
        let _guard = self.lock.lock().await;

        let seed = input.seed.unwrap_or(self.config.seed);
        let version = self.registry.next_version().await?;

        let mut trainer_config = self.config.trainer_config();
        trainer_config.forest.seed = seed;
        let trainer = ModelTrainer::new(trainer_config);
        let store = self.artifacts.clone();
        let samples = input.samples;
        let synthetic = input.synthetic_samples.unwrap_or(self.config.synthetic_samples);
        let job_version = version.clone();

        let (artifact, stored) = tokio::task::spawn_blocking(move || {
            let samples = if samples.is_empty() {
                tracing::info!(samples = synthetic, seed, "No samples supplied, training on synthetic data");
                synthesize(seed, synthetic, &SynthesisConfig::default())?
            } else {
                samples
            };
            let artifact = trainer.train(&samples, &job_version)?;
            let stored = store.save(&artifact)?;
            Ok::<_, crate::ml::MlError>((artifact, stored))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))??;

        let artifact_path = stored.path.to_string_lossy().into_owned();
        let registered = self
            .registry
            .register_active(NewModelVersion {
                version: version.clone(),
                artifact_path: artifact_path.clone(),
                checksum: stored.checksum.clone(),
                metrics: artifact.metrics,
                feature_importance: artifact.feature_importance.clone(),
            })
            .await;

        if let Err(e) = registered {
            if let Err(cleanup) = self.artifacts.remove(&stored.path) {
                tracing::warn!(path = %artifact_path, error = %cleanup, "Failed to remove unregistered artifact");
            }
            return Err(e);
        }

        let outcome = TrainingOutcome {
            status: "success",
            version: version.to_string(),
            metrics: artifact.metrics,
            artifact_path,
            checksum: stored.checksum,
            feature_importance: artifact.feature_importance.clone(),
        };

        let predictor = Predictor::from_artifact(Arc::new(artifact), self.config.degraded_defaults());
        *self.predictor.write().await = Arc::new(predictor);

        tracing::info!(
            version = %outcome.version,
            r2 = outcome.metrics.r2,
            mae = outcome.metrics.mae,
            "Activated newly trained model"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::DegradedDefaults;
    use crate::services::registry::InMemoryModelRegistry;
    use tempfile::TempDir;
    use tokio::sync::RwLock;

    fn small_config(dir: &TempDir) -> MlConfig {
        MlConfig {
            artifact_dir: dir.path().to_path_buf(),
            min_samples: 50,
            test_fraction: 0.2,
            cv_folds: 3,
            split: shared::SplitStrategy::Random,
            n_estimators: 10,
            max_depth: 8,
            min_samples_split: 5,
            min_samples_leaf: 2,
            seed: 7,
            search_iterations: 0,
            search_folds: 3,
            synthetic_samples: 200,
            degraded_yield: 3500.0,
            degraded_confidence: 0.5,
            default_baseline_yield: 3200.0,
        }
    }

    fn service(dir: &TempDir) -> (TrainingService, SharedPredictor) {
        let predictor: SharedPredictor =
            Arc::new(RwLock::new(Arc::new(Predictor::untrained(DegradedDefaults::default()))));
        let service = TrainingService::new(
            predictor.clone(),
            Arc::new(InMemoryModelRegistry::new()),
            ArtifactStore::new(dir.path()),
            small_config(dir),
        );
        (service, predictor)
    }

    #[tokio::test]
    async fn test_training_activates_new_version() {
        let dir = TempDir::new().unwrap();
        let (service, predictor) = service(&dir);

        let first = service.train(TrainInput::default()).await.unwrap();
        assert_eq!(first.version, "1.0.0");
        assert_eq!(first.status, "success");
        assert!(std::path::Path::new(&first.artifact_path).exists());
        assert_eq!(predictor.read().await.version(), "1.0.0");

        let second = service.train(TrainInput::default()).await.unwrap();
        assert_eq!(second.version, "1.0.1");

        let versions = service.versions().await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions.iter().filter(|v| v.is_active).count(), 1);
        let active = service.active_version().await.unwrap().unwrap();
        assert_eq!(active.version, "1.0.1");
        assert_eq!(active.feature_importance.0, second.feature_importance);
        assert_eq!(active.feature_importance.len(), shared::MODEL_FEATURE_COUNT);
    }

    #[tokio::test]
    async fn test_insufficient_samples_keep_previous_model() {
        let dir = TempDir::new().unwrap();
        let (service, predictor) = service(&dir);

        let input = TrainInput {
            samples: synthesize(1, 10, &SynthesisConfig::default()).unwrap(),
            ..TrainInput::default()
        };
        let result = service.train(input).await;

        assert!(matches!(result, Err(AppError::InsufficientTrainingData(_))));
        assert!(!predictor.read().await.is_trained());
        assert!(service.versions().await.unwrap().is_empty());
    }
}
