//! HTTP router smoke tests
//!
//! Drives the full router with in-memory stores and no external providers.

use agri_siddhi::external::ReadingsProvider;
use agri_siddhi::ml::{
    synthesize, ArtifactStore, ForestParams, ModelArtifact, ModelTrainer, SynthesisConfig, TrainerConfig,
};
use agri_siddhi::{create_app, AppState, Config};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

async fn app(dir: &TempDir) -> Router {
    let mut config = Config::load().unwrap();
    config.database.url = None;
    config.ml.artifact_dir = dir.path().to_path_buf();
    config.ml.n_estimators = 10;
    config.ml.cv_folds = 3;
    config.ml.synthetic_samples = 300;

    let state = AppState::with_readings(config, None, ReadingsProvider::default())
        .await
        .unwrap();
    create_app(state)
}

/// Train a small model straight into the artifact directory, bypassing the registry
fn offline_artifact(dir: &TempDir, edit: impl FnOnce(&mut ModelArtifact)) {
    let samples = synthesize(17, 200, &SynthesisConfig::default()).unwrap();
    let trainer = ModelTrainer::new(TrainerConfig {
        cv_folds: 3,
        forest: ForestParams {
            n_estimators: 8,
            ..ForestParams::default()
        },
        ..TrainerConfig::default()
    });
    let mut artifact = trainer.train(&samples, &semver::Version::new(1, 0, 4)).unwrap();
    edit(&mut artifact);
    ArtifactStore::new(dir.path()).save(&artifact).unwrap();
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn prediction_request(farm_id: &str) -> Value {
    json!({
        "farm_id": farm_id,
        "district": "Coimbatore",
        "season": "Kharif",
        "soil_type": "Loamy",
        "reference_date": "2024-09-01",
        "features": {
            "rainfall": 750.0,
            "avg_temperature": "28.5",
            "soil_moisture": 42.0,
            "soil_ph": null
        }
    })
}

#[tokio::test]
async fn test_health_reports_untrained_model() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "not_configured");
    assert_eq!(body["model_trained"], false);
    assert_eq!(body["model_version"], "untrained");
}

#[tokio::test]
async fn test_degraded_prediction_and_history() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, body) = send(&app, "POST", "/api/v1/predictions", Some(prediction_request("farm-7"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_trained"], false);
    assert_eq!(body["predicted_yield_kg_per_ha"], 3500.0);
    assert_eq!(body["baseline_yield_kg_per_ha"], 3800.0);
    assert!(body["recommendations"].as_array().unwrap().len() >= 3);

    let (status, latest) = send(&app, "GET", "/api/v1/predictions/farm/farm-7/latest", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["id"], body["id"]);
    assert_eq!(latest["features"]["total_rainfall"], 750.0);

    let (status, history) = send(&app, "GET", "/api/v1/predictions/farm/farm-7/history?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_error_responses() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, body) = send(&app, "GET", "/api/v1/predictions/farm/ghost/latest", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, body) = send(&app, "POST", "/api/v1/predictions", Some(prediction_request(""))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "farm_id");

    let (status, _) = send(&app, "GET", "/api/v1/predictions/farm/farm-1/history?limit=500", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/v1/models/active", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_training_activates_model_for_predictions() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, body) = send(&app, "POST", "/api/v1/models/train", Some(json!({ "seed": 3 }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["version"], "1.0.0");
    assert_eq!(body["metrics"]["train_samples"], 240);

    let (status, active) = send(&app, "GET", "/api/v1/models/active", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["version"], "1.0.0");
    assert_eq!(active["is_active"], true);

    let (status, prediction) = send(&app, "POST", "/api/v1/predictions", Some(prediction_request("farm-9"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prediction["is_trained"], true);
    assert_eq!(prediction["model_version"], "1.0.0");
    assert_eq!(prediction["confidence_method"], "ensemble");

    let mut unknown = prediction_request("farm-9");
    unknown["district"] = json!("Atlantis");
    let (status, body) = send(&app, "POST", "/api/v1/predictions", Some(unknown)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "UNKNOWN_CATEGORY");

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["model_trained"], true);
}

#[tokio::test]
async fn test_offline_artifact_is_served_without_database() {
    let dir = TempDir::new().unwrap();
    offline_artifact(&dir, |_| {});
    let app = app(&dir).await;

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["model_trained"], true);
    assert_eq!(health["model_version"], "1.0.4");

    let (status, active) = send(&app, "GET", "/api/v1/models/active", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["version"], "1.0.4");
    assert_eq!(active["feature_importance"].as_array().unwrap().len(), 27);

    let (status, prediction) = send(&app, "POST", "/api/v1/predictions", Some(prediction_request("farm-3"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prediction["is_trained"], true);

    let (_, body) = send(&app, "POST", "/api/v1/models/train", Some(json!({ "seed": 1 }))).await;
    assert_eq!(body["version"], "1.0.5");
}

#[tokio::test]
async fn test_drifted_artifact_fails_predictions() {
    let dir = TempDir::new().unwrap();
    offline_artifact(&dir, |artifact| artifact.feature_names.swap(0, 1));
    let app = app(&dir).await;

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["model_trained"], true);

    for farm in ["farm-1", "farm-2"] {
        let (status, body) = send(&app, "POST", "/api/v1/predictions", Some(prediction_request(farm))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "SCHEMA_DRIFT");
    }

    let (status, _) = send(&app, "GET", "/api/v1/predictions/farm/farm-1/latest", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_insufficient_training_data_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let samples = synthesize(1, 10, &SynthesisConfig::default()).unwrap();
    let (status, body) = send(&app, "POST", "/api/v1/models/train", Some(json!({ "samples": samples }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_TRAINING_DATA");

    let (_, versions) = send(&app, "GET", "/api/v1/models", None).await;
    assert!(versions.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_recommendations_and_optimization() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/recommendations",
        Some(json!({
            "features": { "soil_moisture": 10.0, "nitrogen": 20.0 },
            "predicted_yield": 2625.0,
            "baseline_yield": 3500.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["yield_vs_average_percent"], -25.0);
    let recs = body["recommendations"].as_array().unwrap();
    assert_eq!(recs[0]["type"], "irrigation");
    assert_eq!(recs[0]["priority"], 1);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/recommendations/optimization",
        Some(json!({
            "features": { "total_rainfall": 0.0, "avg_temperature": 30.0 },
            "predicted_yield": 3500.0,
            "district": "Erode",
            "crop_stage": "mid_season"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["baseline_yield_kg_per_ha"], 3500.0);
    assert_eq!(body["fertilizer"]["nitrogen"]["amount_kg_per_ha"], 120.0);
    assert_eq!(body["irrigation"]["timing"], "immediate");

    let (status, districts) = send(&app, "GET", "/api/v1/districts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(districts.as_array().unwrap().len(), 9);
}
