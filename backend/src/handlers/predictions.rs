//! HTTP handlers for yield predictions

use axum::{
    extract::{Path, Query, State},
    Json,
};
use shared::{Page, PredictionRecord};
use validator::Validate;

use crate::error::AppResult;
use crate::services::prediction::{PredictInput, PredictionResponse};
use crate::AppState;

/// Predict yield for a farm and record the result
pub async fn create_prediction(
    State(state): State<AppState>,
    Json(input): Json<PredictInput>,
) -> AppResult<Json<PredictionResponse>> {
    input.validate()?;
    let prediction = state.predictions.predict(input).await?;
    Ok(Json(prediction))
}

/// Get the most recent prediction for a farm
pub async fn get_latest_prediction(
    State(state): State<AppState>,
    Path(farm_id): Path<String>,
) -> AppResult<Json<PredictionRecord>> {
    let record = state.predictions.latest(&farm_id).await?;
    Ok(Json(record))
}

/// Get a farm's prediction history
pub async fn get_prediction_history(
    State(state): State<AppState>,
    Path(farm_id): Path<String>,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<PredictionRecord>>> {
    let history = state.predictions.history(&farm_id, page).await?;
    Ok(Json(history))
}
