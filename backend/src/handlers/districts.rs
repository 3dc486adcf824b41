//! District reference data

use axum::{extract::State, Json};
use shared::District;

use crate::AppState;

pub async fn list_districts(State(state): State<AppState>) -> Json<Vec<District>> {
    Json(state.predictions.districts().to_vec())
}
