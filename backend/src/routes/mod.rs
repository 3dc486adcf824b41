//! Route definitions for the Agri-Siddhi yield service

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/districts", get(handlers::list_districts))
        .nest("/models", model_routes())
        .nest("/predictions", prediction_routes())
        .nest("/recommendations", recommendation_routes())
}

/// Model training and registry routes
fn model_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_models))
        .route("/train", post(handlers::train_model))
        .route("/active", get(handlers::get_active_model))
}

/// Prediction routes
fn prediction_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_prediction))
        .route("/farm/:farm_id/latest", get(handlers::get_latest_prediction))
        .route("/farm/:farm_id/history", get(handlers::get_prediction_history))
}

/// Recommendation and optimization routes
fn recommendation_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_recommendations))
        .route("/optimization", post(handlers::create_optimization))
}
