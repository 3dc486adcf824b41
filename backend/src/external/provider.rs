//! Merging of external readings
//!
//! Sources are queried in order and later sources overwrite earlier ones.
//! A failing source only means its fields fall back to the normalizer
//! defaults, so errors are logged and swallowed here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use shared::RawFeatures;

use super::ambee::AmbeeSoilClient;
use super::open_meteo::OpenMeteoClient;
use crate::config::ProvidersConfig;
use crate::error::{AppError, AppResult};

/// Where and over which window readings are wanted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingsQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub end_date: NaiveDate,
    pub days: i64,
}

#[async_trait]
pub trait ReadingsSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, query: &ReadingsQuery) -> AppResult<RawFeatures>;
}

#[derive(Clone, Default)]
pub struct ReadingsProvider {
    sources: Vec<Arc<dyn ReadingsSource>>,
}

impl ReadingsProvider {
    pub fn new(sources: Vec<Arc<dyn ReadingsSource>>) -> Self {
        Self { sources }
    }

    /// Open-Meteo always, Ambee only when an API key is configured
    pub fn from_config(config: &ProvidersConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;

        let mut sources: Vec<Arc<dyn ReadingsSource>> = vec![Arc::new(OpenMeteoClient::with_base_url(
            client.clone(),
            config.open_meteo_url.clone(),
        ))];
        match &config.ambee_api_key {
            Some(key) if !key.is_empty() => sources.push(Arc::new(AmbeeSoilClient::with_base_url(
                client,
                key.clone(),
                config.ambee_url.clone(),
            ))),
            _ => tracing::info!("No Ambee API key configured, soil readings disabled"),
        }
        Ok(Self::new(sources))
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Readings from every source that answered
    pub async fn collect(&self, query: &ReadingsQuery) -> RawFeatures {
        let mut merged = RawFeatures::new();
        for source in &self.sources {
            match source.fetch(query).await {
                Ok(readings) => {
                    tracing::debug!(source = source.name(), fields = readings.len(), "Readings fetched");
                    merged.merge_from(&readings);
                }
                Err(e) => {
                    tracing::warn!(
                        source = source.name(),
                        error = %e,
                        "Data unavailable, fields fall back to defaults"
                    );
                }
            }
        }
        merged
    }
}

/// Lay explicit values over provider readings.
///
/// A provider entry is dropped when the caller supplied the same feature under
/// any of its names, so an alias in the request still beats the provider.
pub fn overlay(provided: &RawFeatures, explicit: &RawFeatures) -> RawFeatures {
    let mut merged = provided.without_fields(&explicit.supplied_fields());
    merged.merge_from(explicit);
    merged
}
