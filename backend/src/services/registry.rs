//! Model version registry
//!
//! Records every trained artifact with its metrics and checksum. Exactly one
//! version is active at a time; registering a new version deactivates the
//! previous one in the same transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{FeatureImportance, ModelMetrics};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;

/// Registered model version
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ModelVersion {
    pub id: Uuid,
    pub version: String,
    pub artifact_path: String,
    pub checksum: String,
    pub metrics: Json<ModelMetrics>,
    /// Sorted descending
    pub feature_importance: Json<Vec<FeatureImportance>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a trained artifact
#[derive(Debug, Clone)]
pub struct NewModelVersion {
    pub version: semver::Version,
    pub artifact_path: String,
    pub checksum: String,
    pub metrics: ModelMetrics,
    pub feature_importance: Vec<FeatureImportance>,
}

/// Patch-increment of the highest registered version, `1.0.0` when empty.
/// Entries that are not valid semver are ignored.
pub fn next_patch_version<'a>(existing: impl IntoIterator<Item = &'a str>) -> semver::Version {
    existing
        .into_iter()
        .filter_map(|v| semver::Version::parse(v).ok())
        .max()
        .map(|mut v| {
            v.patch += 1;
            v.pre = semver::Prerelease::EMPTY;
            v.build = semver::BuildMetadata::EMPTY;
            v
        })
        .unwrap_or_else(|| semver::Version::new(1, 0, 0))
}

#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// All versions, newest first
    async fn list(&self) -> AppResult<Vec<ModelVersion>>;

    async fn active(&self) -> AppResult<Option<ModelVersion>>;

    /// Register `entry` as the only active version
    async fn register_active(&self, entry: NewModelVersion) -> AppResult<ModelVersion>;

    async fn next_version(&self) -> AppResult<semver::Version> {
        let versions = self.list().await?;
        Ok(next_patch_version(versions.iter().map(|v| v.version.as_str())))
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[derive(Clone)]
pub struct PgModelRegistry {
    db: PgPool,
}

impl PgModelRegistry {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ModelRegistry for PgModelRegistry {
    async fn list(&self) -> AppResult<Vec<ModelVersion>> {
        let versions = sqlx::query_as::<_, ModelVersion>(
            r#"
            SELECT id, version, artifact_path, checksum, metrics, feature_importance, is_active, created_at
            FROM model_versions
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(versions)
    }

    async fn active(&self) -> AppResult<Option<ModelVersion>> {
        let version = sqlx::query_as::<_, ModelVersion>(
            r#"
            SELECT id, version, artifact_path, checksum, metrics, feature_importance, is_active, created_at
            FROM model_versions
            WHERE is_active = TRUE
            "#,
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(version)
    }

    async fn register_active(&self, entry: NewModelVersion) -> AppResult<ModelVersion> {
        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE model_versions SET is_active = FALSE WHERE is_active = TRUE")
            .execute(&mut *tx)
            .await?;

        let version = sqlx::query_as::<_, ModelVersion>(
            r#"
            INSERT INTO model_versions (id, version, artifact_path, checksum, metrics, feature_importance, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            RETURNING id, version, artifact_path, checksum, metrics, feature_importance, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.version.to_string())
        .bind(&entry.artifact_path)
        .bind(&entry.checksum)
        .bind(Json(entry.metrics))
        .bind(Json(&entry.feature_importance))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(version = %version.version, "Activated model version");
        Ok(version)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Registry used when no database is configured
#[derive(Default)]
pub struct InMemoryModelRegistry {
    versions: RwLock<Vec<ModelVersion>>,
}

impl InMemoryModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelRegistry for InMemoryModelRegistry {
    async fn list(&self) -> AppResult<Vec<ModelVersion>> {
        let mut versions = self.versions.read().await.clone();
        versions.reverse();
        Ok(versions)
    }

    async fn active(&self) -> AppResult<Option<ModelVersion>> {
        Ok(self
            .versions
            .read()
            .await
            .iter()
            .find(|v| v.is_active)
            .cloned())
    }

    async fn register_active(&self, entry: NewModelVersion) -> AppResult<ModelVersion> {
        let mut versions = self.versions.write().await;
        for v in versions.iter_mut() {
            v.is_active = false;
        }
        let version = ModelVersion {
            id: Uuid::new_v4(),
            version: entry.version.to_string(),
            artifact_path: entry.artifact_path,
            checksum: entry.checksum,
            metrics: Json(entry.metrics),
            feature_importance: Json(entry.feature_importance),
            is_active: true,
            created_at: Utc::now(),
        };
        versions.push(version.clone());

        tracing::info!(version = %version.version, "Activated model version");
        Ok(version)
    }
}
