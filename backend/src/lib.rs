//! Agri-Siddhi yield service
//!
//! Crop-yield prediction for smallholder farms: feature normalization, a
//! random forest trained on real or synthetic samples, recommendations and
//! input optimization, served over HTTP.

use std::sync::Arc;

use axum::{routing::get, Router};
use shared::RecommendationEngine;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod ml;
pub mod routes;
pub mod services;

pub use config::Config;

use crate::error::AppResult;
use crate::external::ReadingsProvider;
use crate::ml::ArtifactStore;
use crate::services::{
    adopt_latest_artifact, load_active_predictor, InMemoryModelRegistry, InMemoryPredictionStore,
    ModelRegistry, PgModelRegistry, PgPredictionStore, PredictionService, PredictionStore,
    SharedPredictor, TrainingService,
};

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "agri_server=debug,agri_siddhi=debug,tower_http=debug,sqlx=warn";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when running on in-memory stores
    pub db: Option<PgPool>,
    pub predictions: PredictionService,
    pub training: TrainingService,
}

impl AppState {
    /// Wire services and load the active model
    pub async fn build(config: Config, db: Option<PgPool>) -> AppResult<Self> {
        let readings = ReadingsProvider::from_config(&config.providers)?;
        Self::with_readings(config, db, readings).await
    }

    /// Same as [`AppState::build`] with an explicit readings provider
    pub async fn with_readings(config: Config, db: Option<PgPool>, readings: ReadingsProvider) -> AppResult<Self> {
        let artifacts = ArtifactStore::new(config.ml.artifact_dir.clone());
        let (registry, store): (Arc<dyn ModelRegistry>, Arc<dyn PredictionStore>) = match &db {
            Some(pool) => (
                Arc::new(PgModelRegistry::new(pool.clone())),
                Arc::new(PgPredictionStore::new(pool.clone())),
            ),
            None => {
                tracing::warn!("No database configured, using in-memory stores");
                let registry = InMemoryModelRegistry::new();
                adopt_latest_artifact(&registry, &artifacts).await;
                (Arc::new(registry), Arc::new(InMemoryPredictionStore::new()))
            }
        };

        let defaults = config.ml.degraded_defaults();
        let predictor = load_active_predictor(registry.as_ref(), &artifacts, defaults).await;
        let predictor: SharedPredictor = Arc::new(RwLock::new(Arc::new(predictor)));

        let engine = RecommendationEngine::new(
            config.recommendations.thresholds,
            config.recommendations.impact.clone(),
        );

        let predictions = PredictionService::new(
            predictor.clone(),
            store,
            readings,
            engine,
            shared::default_districts(),
            config.ml.default_baseline_yield,
            config.providers.history_days,
        );
        let training = TrainingService::new(predictor, registry, artifacts, config.ml.clone());

        Ok(Self {
            config: Arc::new(config),
            db,
            predictions,
            training,
        })
    }
}

/// Install the global fmt subscriber
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Agri-Siddhi Yield Service API v1.0"
}
