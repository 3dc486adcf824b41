//! Model registry integration tests
//!
//! - Semver patch bumps are monotonic
//! - Exactly one version is active after every registration
//! - Startup loading falls back to the untrained predictor for unreadable
//!   artifacts and keeps drifted ones so requests fail loudly

use std::sync::Arc;

use agri_siddhi::ml::{synthesize, ArtifactStore, DegradedDefaults, MlError, ModelTrainer, SynthesisConfig};
use agri_siddhi::services::{adopt_latest_artifact, load_active_predictor};
use agri_siddhi::services::registry::{
    next_patch_version, InMemoryModelRegistry, ModelRegistry, NewModelVersion,
};
use proptest::prelude::*;
use shared::{FeatureImportance, ModelMetrics, RawFeatures, SampleContext, TemporalContext};
use tempfile::TempDir;

fn metrics() -> ModelMetrics {
    ModelMetrics {
        mae: 300.0,
        rmse: 400.0,
        r2: 0.7,
        cv_mae: 320.0,
        train_samples: 160,
        test_samples: 40,
    }
}

fn entry(version: semver::Version, path: &str, checksum: &str) -> NewModelVersion {
    NewModelVersion {
        version,
        artifact_path: path.to_string(),
        checksum: checksum.to_string(),
        metrics: metrics(),
        feature_importance: vec![FeatureImportance {
            feature: "soil_moisture".to_string(),
            importance: 1.0,
        }],
    }
}

#[tokio::test]
async fn test_registry_keeps_single_active_version() {
    let registry = InMemoryModelRegistry::new();
    assert!(registry.active().await.unwrap().is_none());
    assert_eq!(registry.next_version().await.unwrap(), semver::Version::new(1, 0, 0));

    for expected in ["1.0.0", "1.0.1", "1.0.2"] {
        let version = registry.next_version().await.unwrap();
        assert_eq!(version.to_string(), expected);
        registry.register_active(entry(version, "model.json", "abc")).await.unwrap();

        let all = registry.list().await.unwrap();
        assert_eq!(all.iter().filter(|v| v.is_active).count(), 1);
        assert_eq!(all[0].version, expected);
        assert!(all[0].is_active);
        assert_eq!(all[0].feature_importance[0].feature, "soil_moisture");
    }

    assert_eq!(registry.active().await.unwrap().unwrap().version, "1.0.2");
}

#[test]
fn test_next_version_ignores_garbage_and_prerelease() {
    let next = next_patch_version(["1.0.3", "not-a-version", "1.2.0-rc.1", "0.9.9"]);
    assert_eq!(next, semver::Version::new(1, 2, 1));

    let next = next_patch_version(["2.0.0", "1.9.9"]);
    assert_eq!(next, semver::Version::new(2, 0, 1));
}

#[tokio::test]
async fn test_loads_registered_artifact() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let samples = synthesize(5, 200, &SynthesisConfig::default()).unwrap();
    let artifact = ModelTrainer::default()
        .train(&samples, &semver::Version::new(1, 0, 0))
        .unwrap();
    let stored = store.save(&artifact).unwrap();

    let registry = InMemoryModelRegistry::new();
    registry
        .register_active(entry(
            artifact.version.clone(),
            &stored.path.to_string_lossy(),
            &stored.checksum,
        ))
        .await
        .unwrap();

    let predictor = load_active_predictor(&registry, &store, DegradedDefaults::default()).await;
    assert!(predictor.is_trained());
    assert_eq!(predictor.version(), "1.0.0");
}

#[tokio::test]
async fn test_drifted_active_artifact_stays_loaded() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let samples = synthesize(5, 200, &SynthesisConfig::default()).unwrap();
    let mut artifact = ModelTrainer::default()
        .train(&samples, &semver::Version::new(1, 0, 0))
        .unwrap();
    artifact.feature_names.swap(0, 1);
    let stored = store.save(&artifact).unwrap();

    let registry = InMemoryModelRegistry::new();
    registry
        .register_active(entry(
            artifact.version.clone(),
            &stored.path.to_string_lossy(),
            &stored.checksum,
        ))
        .await
        .unwrap();

    let predictor = load_active_predictor(&registry, &store, DegradedDefaults::default()).await;
    assert!(predictor.is_trained());
    let result = predictor.predict(&RawFeatures::new(), &TemporalContext::default(), &SampleContext::default());
    assert!(matches!(result, Err(MlError::SchemaDrift(_))));
}

#[tokio::test]
async fn test_latest_artifact_adopted_by_empty_registry() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let registry = InMemoryModelRegistry::new();
    assert!(adopt_latest_artifact(&registry, &store).await.is_none());

    let samples = synthesize(8, 120, &SynthesisConfig::default()).unwrap();
    let artifact = ModelTrainer::default()
        .train(&samples, &semver::Version::new(1, 0, 7))
        .unwrap();
    let stored = store.save(&artifact).unwrap();

    let adopted = adopt_latest_artifact(&registry, &store).await.unwrap();
    assert_eq!(adopted.version, "1.0.7");
    assert_eq!(adopted.checksum, stored.checksum);
    assert!(adopted.is_active);
    assert_eq!(adopted.feature_importance.0, artifact.feature_importance);
    assert_eq!(registry.next_version().await.unwrap(), semver::Version::new(1, 0, 8));

    // An active version is never replaced
    assert!(adopt_latest_artifact(&registry, &store).await.is_none());
    assert_eq!(registry.list().await.unwrap().len(), 1);

    let predictor = load_active_predictor(&registry, &store, DegradedDefaults::default()).await;
    assert_eq!(predictor.version(), "1.0.7");
}

#[tokio::test]
async fn test_corrupt_active_artifact_serves_defaults() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let path = dir.path().join("model_20240101_000000_v1.0.0.json");
    std::fs::write(&path, b"not json").unwrap();

    let registry = InMemoryModelRegistry::new();
    registry
        .register_active(entry(
            semver::Version::new(1, 0, 0),
            &path.to_string_lossy(),
            &agri_siddhi::ml::artifact::checksum(b"not json"),
        ))
        .await
        .unwrap();

    let predictor = load_active_predictor(&registry, &store, DegradedDefaults::default()).await;
    assert!(!predictor.is_trained());
}

#[tokio::test]
async fn test_missing_active_artifact_serves_defaults() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let registry: Arc<dyn ModelRegistry> = Arc::new(InMemoryModelRegistry::new());
    registry
        .register_active(entry(semver::Version::new(1, 0, 0), "/nonexistent/model.json", "abc"))
        .await
        .unwrap();

    let predictor = load_active_predictor(registry.as_ref(), &store, DegradedDefaults::default()).await;
    assert!(!predictor.is_trained());
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The next version is strictly greater than every valid existing version
    #[test]
    fn prop_next_version_is_greater(
        versions in prop::collection::vec((0u64..5, 0u64..20, 0u64..50), 0..10)
    ) {
        let existing: Vec<String> = versions
            .iter()
            .map(|(a, b, c)| format!("{}.{}.{}", a, b, c))
            .collect();
        let next = next_patch_version(existing.iter().map(String::as_str));
        for v in &existing {
            prop_assert!(next > semver::Version::parse(v).unwrap());
        }
    }
}
