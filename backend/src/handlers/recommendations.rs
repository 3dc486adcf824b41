//! HTTP handlers for recommendations and input optimization

use axum::{extract::State, Json};
use validator::Validate;

use crate::error::AppResult;
use crate::services::prediction::{
    OptimizationInput, OptimizationResponse, RecommendInput, RecommendationsResponse,
};
use crate::AppState;

pub async fn create_recommendations(
    State(state): State<AppState>,
    Json(input): Json<RecommendInput>,
) -> AppResult<Json<RecommendationsResponse>> {
    input.validate()?;
    let response = state.predictions.recommend(input).await?;
    Ok(Json(response))
}

/// Fertilizer plan and irrigation schedule
pub async fn create_optimization(
    State(state): State<AppState>,
    Json(input): Json<OptimizationInput>,
) -> AppResult<Json<OptimizationResponse>> {
    input.validate()?;
    let response = state.predictions.optimize(input).await?;
    Ok(Json(response))
}
