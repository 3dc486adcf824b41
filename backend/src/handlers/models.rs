//! HTTP handlers for model training and the version registry

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::training::{TrainInput, TrainingOutcome};
use crate::services::ModelVersion;
use crate::AppState;

/// Train and activate a new model version
pub async fn train_model(
    State(state): State<AppState>,
    Json(input): Json<TrainInput>,
) -> AppResult<(StatusCode, Json<TrainingOutcome>)> {
    input.validate()?;
    let outcome = state.training.train(input).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// List registered model versions, newest first
pub async fn list_models(State(state): State<AppState>) -> AppResult<Json<Vec<ModelVersion>>> {
    let versions = state.training.versions().await?;
    Ok(Json(versions))
}

/// Get the active model version
pub async fn get_active_model(State(state): State<AppState>) -> AppResult<Json<ModelVersion>> {
    let version = state
        .training
        .active_version()
        .await?
        .ok_or_else(|| AppError::NotFound("Active model".to_string()))?;
    Ok(Json(version))
}
