//! Configuration management for the Agri-Siddhi yield service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with AGRI_ prefix

use std::path::PathBuf;

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::{ImpactTemplates, RecommendationThresholds, SplitStrategy};

use crate::ml::{DegradedDefaults, ForestParams, SearchSettings, TrainerConfig};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Model training and inference
    pub ml: MlConfig,

    /// External readings providers
    pub providers: ProvidersConfig,

    /// Recommendation rules and wording
    #[serde(default)]
    pub recommendations: RecommendationsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. In-memory stores are used when unset.
    pub url: Option<String>,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MlConfig {
    /// Directory holding serialized model artifacts
    pub artifact_dir: PathBuf,

    pub min_samples: usize,
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub split: SplitStrategy,

    pub n_estimators: usize,
    /// 0 grows trees until the leaf constraints stop them
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,

    /// Randomized search iterations, 0 disables the search
    pub search_iterations: usize,
    pub search_folds: usize,

    /// Synthetic sample count used when a training request carries no data
    pub synthetic_samples: usize,

    pub degraded_yield: f64,
    pub degraded_confidence: f64,

    /// Baseline used when a farm's district is unknown
    pub default_baseline_yield: f64,
}

impl MlConfig {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            max_depth: (self.max_depth > 0).then_some(self.max_depth),
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            seed: self.seed,
            ..ForestParams::default()
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            min_samples: self.min_samples,
            test_fraction: self.test_fraction,
            cv_folds: self.cv_folds,
            split: self.split,
            forest: self.forest_params(),
            search: (self.search_iterations > 0).then(|| SearchSettings {
                iterations: self.search_iterations,
                folds: self.search_folds,
                ..SearchSettings::default()
            }),
        }
    }

    pub fn degraded_defaults(&self) -> DegradedDefaults {
        DegradedDefaults {
            yield_kg_per_ha: self.degraded_yield,
            confidence: self.degraded_confidence,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    /// Open-Meteo archive API endpoint
    pub open_meteo_url: String,

    /// Ambee soil API endpoint
    pub ambee_url: String,

    /// Ambee API key, soil readings are skipped without one
    pub ambee_api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Days of weather history summarized per request
    pub history_days: i64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RecommendationsConfig {
    #[serde(default)]
    pub thresholds: RecommendationThresholds,

    #[serde(default)]
    pub impact: ImpactTemplates,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("AGRI_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("ml.artifact_dir", "models")?
            .set_default("ml.min_samples", 50)?
            .set_default("ml.test_fraction", 0.2)?
            .set_default("ml.cv_folds", 5)?
            .set_default("ml.split", "random")?
            .set_default("ml.n_estimators", 200)?
            .set_default("ml.max_depth", 15)?
            .set_default("ml.min_samples_split", 5)?
            .set_default("ml.min_samples_leaf", 2)?
            .set_default("ml.seed", 42)?
            .set_default("ml.search_iterations", 0)?
            .set_default("ml.search_folds", 3)?
            .set_default("ml.synthetic_samples", 2000)?
            .set_default("ml.degraded_yield", 3500.0)?
            .set_default("ml.degraded_confidence", 0.5)?
            .set_default("ml.default_baseline_yield", 3200.0)?
            .set_default("providers.open_meteo_url", "https://archive-api.open-meteo.com/v1/archive")?
            .set_default("providers.ambee_url", "https://api.ambeedata.com")?
            .set_default("providers.timeout_secs", 10)?
            .set_default("providers.history_days", 30)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (AGRI_ prefix)
            .add_source(
                Environment::with_prefix("AGRI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
