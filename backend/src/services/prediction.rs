//! Prediction service
//!
//! Answers yield questions with whatever model is currently active, attaches
//! recommendations and keeps an append-only history per farm.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    find_district, nearest_district, validate_coordinates, validate_farm_id, validate_page,
    yield_vs_average_percent, AgroSeason, District, FeatureVector, GpsCoordinates, PredictionRecord,
    Page, RawFeatures, Recommendation, RecommendationEngine, SampleContext, TemporalContext,
    YieldPrediction,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use uuid::Uuid;
use validator::Validate;

use super::optimization::{CropStage, FertilizerPlan, IrrigationSchedule, OptimizationEngine};
use super::registry::{ModelRegistry, ModelVersion, NewModelVersion};
use super::SharedPredictor;
use crate::error::{AppError, AppResult};
use crate::external::{overlay, ReadingsProvider, ReadingsQuery};
use crate::ml::{ArtifactStore, DegradedDefaults, MlError, ModelArtifact, Predictor, StoredArtifact};

// ============================================================================
// Storage
// ============================================================================

#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn insert(&self, record: &PredictionRecord) -> AppResult<()>;

    async fn latest(&self, farm_id: &str) -> AppResult<Option<PredictionRecord>>;

    /// Newest first
    async fn history(&self, farm_id: &str, page: Page) -> AppResult<Vec<PredictionRecord>>;
}

#[derive(Debug, FromRow)]
struct PredictionRow {
    id: Uuid,
    farm_id: String,
    model_version: String,
    features: Json<FeatureVector>,
    predicted_yield_kg_per_ha: f64,
    confidence: f64,
    is_trained: bool,
    recommendations: Json<Vec<Recommendation>>,
    created_at: DateTime<Utc>,
}

impl From<PredictionRow> for PredictionRecord {
    fn from(row: PredictionRow) -> Self {
        Self {
            id: row.id,
            farm_id: row.farm_id,
            model_version: row.model_version,
            features: row.features.0,
            predicted_yield_kg_per_ha: row.predicted_yield_kg_per_ha,
            confidence: row.confidence,
            is_trained: row.is_trained,
            recommendations: row.recommendations.0,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgPredictionStore {
    db: PgPool,
}

impl PgPredictionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PredictionStore for PgPredictionStore {
    async fn insert(&self, record: &PredictionRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions (
                id, farm_id, model_version, features, predicted_yield_kg_per_ha,
                confidence, is_trained, recommendations, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.farm_id)
        .bind(&record.model_version)
        .bind(Json(&record.features))
        .bind(record.predicted_yield_kg_per_ha)
        .bind(record.confidence)
        .bind(record.is_trained)
        .bind(Json(&record.recommendations))
        .bind(record.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn latest(&self, farm_id: &str) -> AppResult<Option<PredictionRecord>> {
        let row = sqlx::query_as::<_, PredictionRow>(
            r#"
            SELECT id, farm_id, model_version, features, predicted_yield_kg_per_ha,
                   confidence, is_trained, recommendations, created_at
            FROM predictions
            WHERE farm_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(farm_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn history(&self, farm_id: &str, page: Page) -> AppResult<Vec<PredictionRecord>> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            r#"
            SELECT id, farm_id, model_version, features, predicted_yield_kg_per_ha,
                   confidence, is_trained, recommendations, created_at
            FROM predictions
            WHERE farm_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(farm_id)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Store used when no database is configured
#[derive(Default)]
pub struct InMemoryPredictionStore {
    records: RwLock<Vec<PredictionRecord>>,
}

impl InMemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PredictionStore for InMemoryPredictionStore {
    async fn insert(&self, record: &PredictionRecord) -> AppResult<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn latest(&self, farm_id: &str) -> AppResult<Option<PredictionRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.farm_id == farm_id)
            .cloned())
    }

    async fn history(&self, farm_id: &str, page: Page) -> AppResult<Vec<PredictionRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.farm_id == farm_id)
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Inputs and Responses
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PredictInput {
    #[validate(length(min = 1, max = 64))]
    pub farm_id: String,
    #[serde(default)]
    pub features: RawFeatures,
    pub district: Option<String>,
    pub season: Option<String>,
    pub soil_type: Option<String>,
    /// Enables provider readings and nearest-district lookup
    pub location: Option<GpsCoordinates>,
    pub planting_date: Option<NaiveDate>,
    /// Defaults to today
    pub reference_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub id: Uuid,
    pub farm_id: String,
    #[serde(flatten)]
    pub prediction: YieldPrediction,
    pub district: Option<String>,
    pub baseline_yield_kg_per_ha: f64,
    pub yield_vs_average_percent: f64,
    pub recommendations: Vec<Recommendation>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecommendInput {
    #[serde(default)]
    pub features: RawFeatures,
    #[validate(range(min = 0.0, max = 20000.0))]
    pub predicted_yield: f64,
    #[validate(range(min = 0.0, max = 20000.0))]
    pub baseline_yield: Option<f64>,
    pub district: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationsResponse {
    pub baseline_yield_kg_per_ha: f64,
    pub yield_vs_average_percent: f64,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OptimizationInput {
    #[serde(default)]
    pub features: RawFeatures,
    /// Predicted with the active model when absent
    #[validate(range(min = 0.0, max = 20000.0))]
    pub predicted_yield: Option<f64>,
    pub district: Option<String>,
    pub season: Option<String>,
    pub soil_type: Option<String>,
    #[serde(default)]
    pub crop_stage: CropStage,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResponse {
    pub predicted_yield_kg_per_ha: f64,
    pub baseline_yield_kg_per_ha: f64,
    pub fertilizer: FertilizerPlan,
    pub irrigation: IrrigationSchedule,
}

// ============================================================================
// Service
// ============================================================================

/// Register the most recently modified artifact on disk when the registry
/// has no active version. Used when no database backs the registry, so a
/// model trained offline is still served.
pub async fn adopt_latest_artifact(registry: &dyn ModelRegistry, artifacts: &ArtifactStore) -> Option<ModelVersion> {
    match registry.active().await {
        Ok(None) => {}
        Ok(Some(_)) => return None,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read model registry");
            return None;
        }
    }

    let store = artifacts.clone();
    let opened = tokio::task::spawn_blocking(move || -> Result<Option<(ModelArtifact, StoredArtifact)>, MlError> {
        store
            .latest()?
            .map(|path| store.open(&path))
            .transpose()
    })
    .await;

    let (artifact, stored) = match opened {
        Ok(Ok(Some(found))) => found,
        Ok(Ok(None)) => return None,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to read latest model artifact");
            return None;
        }
        Err(e) => {
            tracing::error!(error = %e, "Artifact loading task failed");
            return None;
        }
    };

    let entry = NewModelVersion {
        version: artifact.version.clone(),
        artifact_path: stored.path.to_string_lossy().into_owned(),
        checksum: stored.checksum,
        metrics: artifact.metrics,
        feature_importance: artifact.feature_importance,
    };
    match registry.register_active(entry).await {
        Ok(version) => {
            tracing::info!(version = %version.version, path = %version.artifact_path, "Adopted model artifact from disk");
            Some(version)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to register model artifact from disk");
            None
        }
    }
}

/// Build the predictor for the registry's active version.
///
/// A missing or unreadable artifact leaves the service untrained. An artifact
/// that no longer matches the feature schema stays loaded so that requests
/// fail with `SchemaDrift`.
pub async fn load_active_predictor(
    registry: &dyn ModelRegistry,
    artifacts: &ArtifactStore,
    defaults: DegradedDefaults,
) -> Predictor {
    let active = match registry.active().await {
        Ok(Some(active)) => active,
        Ok(None) => {
            tracing::info!("No active model registered, serving default predictions");
            return Predictor::untrained(defaults);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to read model registry, serving default predictions");
            return Predictor::untrained(defaults);
        }
    };

    let store = artifacts.clone();
    let path = std::path::PathBuf::from(&active.artifact_path);
    let checksum = active.checksum.clone();
    let loaded = tokio::task::spawn_blocking(move || store.load(&path, Some(checksum.as_str()))).await;

    let artifact = match loaded {
        Ok(Ok(artifact)) => artifact,
        Ok(Err(e)) => {
            tracing::error!(version = %active.version, error = %e, "Failed to load active model artifact");
            return Predictor::untrained(defaults);
        }
        Err(e) => {
            tracing::error!(version = %active.version, error = %e, "Artifact loading task failed");
            return Predictor::untrained(defaults);
        }
    };

    tracing::info!(version = %active.version, "Loaded active model");
    Predictor::from_artifact(Arc::new(artifact), defaults)
}

#[derive(Clone)]
pub struct PredictionService {
    predictor: SharedPredictor,
    store: Arc<dyn PredictionStore>,
    readings: ReadingsProvider,
    engine: Arc<RecommendationEngine>,
    optimizer: Arc<OptimizationEngine>,
    districts: Arc<Vec<District>>,
    default_baseline: f64,
    history_days: i64,
}

impl PredictionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        predictor: SharedPredictor,
        store: Arc<dyn PredictionStore>,
        readings: ReadingsProvider,
        engine: RecommendationEngine,
        districts: Vec<District>,
        default_baseline: f64,
        history_days: i64,
    ) -> Self {
        Self {
            predictor,
            store,
            readings,
            engine: Arc::new(engine),
            optimizer: Arc::new(OptimizationEngine::default()),
            districts: Arc::new(districts),
            default_baseline,
            history_days,
        }
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    /// Snapshot of the active predictor, held for the whole request
    pub async fn predictor(&self) -> Arc<Predictor> {
        self.predictor.read().await.clone()
    }

    fn resolve_district(&self, name: Option<&str>, location: Option<&GpsCoordinates>) -> Option<&District> {
        match (name, location) {
            (Some(name), _) => find_district(&self.districts, name),
            (None, Some(coords)) => {
                let (lat, lon) = coords.as_degrees();
                nearest_district(&self.districts, lat, lon)
            }
            (None, None) => None,
        }
    }

    fn baseline_for(&self, district: Option<&District>) -> f64 {
        district
            .map(|d| d.base_yield_kg_per_ha)
            .unwrap_or(self.default_baseline)
    }

    /// Predict, attach recommendations and record the result
    pub async fn predict(&self, input: PredictInput) -> AppResult<PredictionResponse> {
        validate_farm_id(&input.farm_id).map_err(|msg| AppError::Validation {
            field: "farm_id".to_string(),
            message: msg.to_string(),
        })?;
        if let Some(coords) = &input.location {
            validate_coordinates(coords).map_err(|msg| AppError::Validation {
                field: "location".to_string(),
                message: msg.to_string(),
            })?;
        }

        let reference_date = input.reference_date.unwrap_or_else(|| Utc::now().date_naive());
        let district = self.resolve_district(input.district.as_deref(), input.location.as_ref());

        let raw = match &input.location {
            Some(coords) if !self.readings.is_empty() => {
                let (latitude, longitude) = coords.as_degrees();
                let query = ReadingsQuery {
                    latitude,
                    longitude,
                    end_date: reference_date,
                    days: self.history_days,
                };
                overlay(&self.readings.collect(&query).await, &input.features)
            }
            _ => input.features.clone(),
        };

        let context = SampleContext {
            district: input
                .district
                .clone()
                .or_else(|| district.map(|d| d.name.clone())),
            season: input.season.clone().or_else(|| {
                Some(AgroSeason::from_month(reference_date.month()).name().to_string())
            }),
            soil_type: input.soil_type.clone(),
        };
        let temporal = TemporalContext::new(input.planting_date, Some(reference_date));

        let predictor = self.predictor().await;
        let prediction = predictor.predict(&raw, &temporal, &context)?;

        let baseline = self.baseline_for(district);
        let recommendations = self.engine.recommend(
            &prediction.features,
            prediction.predicted_yield_kg_per_ha,
            baseline,
        );

        let record = PredictionRecord::from_prediction(&input.farm_id, &prediction, recommendations);
        self.store.insert(&record).await?;

        tracing::info!(
            farm_id = %record.farm_id,
            model_version = %record.model_version,
            predicted = record.predicted_yield_kg_per_ha,
            "Prediction recorded"
        );

        Ok(PredictionResponse {
            id: record.id,
            farm_id: record.farm_id,
            yield_vs_average_percent: yield_vs_average_percent(prediction.predicted_yield_kg_per_ha, baseline),
            prediction,
            district: context.district,
            baseline_yield_kg_per_ha: baseline,
            recommendations: record.recommendations,
            created_at: record.created_at,
        })
    }

    pub async fn latest(&self, farm_id: &str) -> AppResult<PredictionRecord> {
        self.store
            .latest(farm_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Prediction for farm {}", farm_id)))
    }

    pub async fn history(&self, farm_id: &str, page: Page) -> AppResult<Vec<PredictionRecord>> {
        validate_page(&page).map_err(|msg| AppError::Validation {
            field: "limit".to_string(),
            message: msg.to_string(),
        })?;
        self.store.history(farm_id, page).await
    }

    /// Recommendations for caller-supplied readings and yield
    pub async fn recommend(&self, input: RecommendInput) -> AppResult<RecommendationsResponse> {
        let predictor = self.predictor().await;
        let normalized = predictor
            .normalizer()
            .normalize(&input.features, &TemporalContext::default());

        let baseline = input
            .baseline_yield
            .unwrap_or_else(|| self.baseline_for(self.resolve_district(input.district.as_deref(), None)));

        Ok(RecommendationsResponse {
            baseline_yield_kg_per_ha: baseline,
            yield_vs_average_percent: yield_vs_average_percent(input.predicted_yield, baseline),
            recommendations: self.engine.recommend(&normalized.vector, input.predicted_yield, baseline),
        })
    }

    /// Fertilizer plan and irrigation schedule
    pub async fn optimize(&self, input: OptimizationInput) -> AppResult<OptimizationResponse> {
        let predictor = self.predictor().await;
        let temporal = TemporalContext::new(None, Some(Utc::now().date_naive()));
        let district = self.resolve_district(input.district.as_deref(), None);

        let (features, predicted_yield) = match input.predicted_yield {
            Some(predicted) => (predictor.normalizer().normalize(&input.features, &temporal).vector, predicted),
            None => {
                let context = SampleContext {
                    district: input.district.clone(),
                    season: input.season.clone(),
                    soil_type: input.soil_type.clone(),
                };
                let prediction = predictor.predict(&input.features, &temporal, &context)?;
                (prediction.features, prediction.predicted_yield_kg_per_ha)
            }
        };

        let baseline = self.baseline_for(district);
        Ok(OptimizationResponse {
            predicted_yield_kg_per_ha: predicted_yield,
            baseline_yield_kg_per_ha: baseline,
            fertilizer: self.optimizer.fertilizer_plan(&features, predicted_yield, baseline),
            irrigation: self.optimizer.irrigation_schedule(&features, input.crop_stage),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{FeatureField, UNTRAINED_MODEL_VERSION};

    fn service() -> PredictionService {
        let predictor = Arc::new(RwLock::new(Arc::new(Predictor::untrained(DegradedDefaults::default()))));
        PredictionService::new(
            predictor,
            Arc::new(InMemoryPredictionStore::new()),
            ReadingsProvider::default(),
            RecommendationEngine::default(),
            shared::default_districts(),
            3200.0,
            30,
        )
    }

    fn input(farm_id: &str) -> PredictInput {
        PredictInput {
            farm_id: farm_id.to_string(),
            features: [("soil_moisture", 15.0)].into_iter().collect(),
            district: Some("Thanjavur".to_string()),
            season: None,
            soil_type: None,
            location: None,
            planting_date: None,
            reference_date: NaiveDate::from_ymd_opt(2024, 8, 1),
        }
    }

    #[tokio::test]
    async fn test_degraded_prediction_is_recorded() {
        let service = service();
        let response = service.predict(input("farm-1")).await.unwrap();

        assert!(!response.prediction.is_trained);
        assert_eq!(response.prediction.model_version, UNTRAINED_MODEL_VERSION);
        assert_eq!(response.baseline_yield_kg_per_ha, 4000.0);
        assert_eq!(response.yield_vs_average_percent, -12.5);
        assert_eq!(response.recommendations[0].priority, 1);

        let latest = service.latest("farm-1").await.unwrap();
        assert_eq!(latest.id, response.id);
        assert_eq!(latest.features.get(FeatureField::SoilMoisture), 15.0);
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let service = service();
        let first = service.predict(input("farm-2")).await.unwrap();
        let second = service.predict(input("farm-2")).await.unwrap();
        service.predict(input("farm-3")).await.unwrap();

        let history = service.history("farm-2", Page::default()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);

        let page = Page { limit: 1, offset: 1 };
        assert_eq!(service.history("farm-2", page).await.unwrap()[0].id, first.id);
    }

    #[tokio::test]
    async fn test_latest_for_unknown_farm() {
        assert!(matches!(service().latest("nobody").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_district_uses_default_baseline() {
        let response = service()
            .recommend(RecommendInput {
                features: RawFeatures::new(),
                predicted_yield: 3200.0,
                baseline_yield: None,
                district: Some("Atlantis".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(response.baseline_yield_kg_per_ha, 3200.0);
        assert_eq!(response.yield_vs_average_percent, 0.0);
    }

    #[tokio::test]
    async fn test_optimize_with_degraded_prediction() {
        let response = service()
            .optimize(OptimizationInput {
                features: RawFeatures::new(),
                predicted_yield: None,
                district: Some("Salem".to_string()),
                season: None,
                soil_type: None,
                crop_stage: CropStage::MidSeason,
            })
            .await
            .unwrap();
        assert_eq!(response.predicted_yield_kg_per_ha, 3500.0);
        assert_eq!(response.baseline_yield_kg_per_ha, 3400.0);
        assert_eq!(response.fertilizer.nitrogen.amount_kg_per_ha, 120.0);
    }
}
