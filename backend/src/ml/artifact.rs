//! Model artifacts and their on-disk store
//!
//! An artifact bundles everything inference needs: the frozen feature order,
//! the categorical encoder, the scaler and the forest. Artifacts are written
//! once and never modified; a SHA-256 checksum of the file is recorded by the
//! registry and verified on load.
//!
//! Loading only rejects files that cannot be read or decoded. An artifact
//! whose feature layout differs from the current schema still loads; the
//! predictor refuses every request against it with `SchemaDrift`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::{model_feature_names, CategoricalEncoder, FeatureImportance, ModelMetrics, MODEL_FEATURE_COUNT};

use super::error::MlError;
use super::forest::{ForestParams, RandomForestRegressor};
use super::scaler::FeatureScaler;

/// Bumped whenever the serialized layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 2;

const FILE_PREFIX: &str = "model_";
const FILE_EXTENSION: &str = "json";

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub version: semver::Version,
    pub created_at: DateTime<Utc>,
    /// Column order the forest was trained on
    pub feature_names: Vec<String>,
    pub encoder: CategoricalEncoder,
    pub scaler: FeatureScaler,
    pub forest: RandomForestRegressor,
    pub metrics: ModelMetrics,
    pub feature_importance: Vec<FeatureImportance>,
    pub hyperparameters: ForestParams,
}

impl ModelArtifact {
    /// Reject serialized layouts this build cannot read
    pub fn check_format(&self) -> Result<(), MlError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(MlError::ArtifactLoad(format!(
                "unsupported artifact format {} (expected {})",
                self.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Reject artifacts whose feature layout does not match this build's schema
    pub fn check_schema(&self) -> Result<(), MlError> {
        let expected = model_feature_names();
        if self.feature_names != expected {
            return Err(MlError::SchemaDrift(format!(
                "artifact {} was trained on {} features in a different order",
                self.version,
                self.feature_names.len()
            )));
        }
        if self.scaler.n_features() != MODEL_FEATURE_COUNT
            || self.forest.n_features() != MODEL_FEATURE_COUNT
        {
            return Err(MlError::SchemaDrift(format!(
                "artifact {} expects {} scaler / {} forest inputs, schema has {}",
                self.version,
                self.scaler.n_features(),
                self.forest.n_features(),
                MODEL_FEATURE_COUNT
            )));
        }
        Ok(())
    }
}

/// Location and checksum of a saved artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub checksum: String,
}

/// Hex-encoded SHA-256 of `bytes`
pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Directory of serialized artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `model_{timestamp}_v{version}.json`
    pub fn file_name(artifact: &ModelArtifact) -> String {
        format!(
            "{}{}_v{}.{}",
            FILE_PREFIX,
            artifact.created_at.format("%Y%m%d_%H%M%S"),
            artifact.version,
            FILE_EXTENSION
        )
    }

    /// Write the artifact via a temporary sibling and rename it into place
    pub fn save(&self, artifact: &ModelArtifact) -> Result<StoredArtifact, MlError> {
        std::fs::create_dir_all(&self.root)?;
        let bytes = serde_json::to_vec(artifact)?;
        let path = self.root.join(Self::file_name(artifact));
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &path)?;

        let stored = StoredArtifact {
            path,
            checksum: checksum(&bytes),
        };
        tracing::info!(
            version = %artifact.version,
            path = %stored.path.display(),
            "Saved model artifact"
        );
        Ok(stored)
    }

    /// Load an artifact, verifying its checksum when one is given
    pub fn load(&self, path: &Path, expected_checksum: Option<&str>) -> Result<ModelArtifact, MlError> {
        let (artifact, stored) = self.open(path)?;
        if let Some(expected) = expected_checksum {
            if !stored.checksum.eq_ignore_ascii_case(expected) {
                return Err(MlError::ArtifactLoad(format!(
                    "checksum mismatch for {}",
                    path.display()
                )));
            }
        }
        Ok(artifact)
    }

    /// Load an artifact together with the checksum of its file
    pub fn open(&self, path: &Path) -> Result<(ModelArtifact, StoredArtifact), MlError> {
        let bytes = std::fs::read(path)
            .map_err(|e| MlError::ArtifactLoad(format!("{}: {}", path.display(), e)))?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .map_err(|e| MlError::ArtifactLoad(format!("{}: {}", path.display(), e)))?;
        artifact.check_format()?;
        let stored = StoredArtifact {
            path: path.to_path_buf(),
            checksum: checksum(&bytes),
        };
        Ok((artifact, stored))
    }

    /// Most recently modified artifact file, if any
    pub fn latest(&self) -> Result<Option<PathBuf>, MlError> {
        if !self.root.exists() {
            return Ok(None);
        }
        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_artifact = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX))
                && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION);
            if !is_artifact {
                continue;
            }
            let modified = std::fs::metadata(&path)?.modified()?;
            let replace = match &newest {
                None => true,
                Some((time, current)) => modified > *time || (modified == *time && path > *current),
            };
            if replace {
                newest = Some((modified, path));
            }
        }
        Ok(newest.map(|(_, path)| path))
    }

    /// Delete an artifact that never made it into the registry
    pub fn remove(&self, path: &Path) -> Result<(), MlError> {
        std::fs::remove_file(path)?;
        tracing::debug!(path = %path.display(), "Removed model artifact");
        Ok(())
    }
}
