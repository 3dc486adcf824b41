//! Open-Meteo client for daily weather history
//!
//! Fetches the last N days of daily aggregates and condenses them into the
//! weather band of the feature schema.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use shared::{summarize_daily_weather, DailyWeather, RawFeatures};

use super::provider::{ReadingsQuery, ReadingsSource};
use crate::error::{AppError, AppResult};

const DAILY_VARIABLES: &str =
    "precipitation_sum,temperature_2m_max,temperature_2m_min,temperature_2m_mean,relative_humidity_2m_mean";

/// Open-Meteo archive API client
#[derive(Clone)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
}

/// Open-Meteo daily response
#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    daily: OpenMeteoDaily,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoDaily {
    time: Vec<NaiveDate>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_mean: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m_mean: Vec<Option<f64>>,
}

impl OpenMeteoDaily {
    fn into_days(self) -> Vec<DailyWeather> {
        let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();
        self.time
            .iter()
            .enumerate()
            .map(|(i, date)| DailyWeather {
                date: *date,
                precipitation_mm: at(&self.precipitation_sum, i),
                temperature_max_c: at(&self.temperature_2m_max, i),
                temperature_min_c: at(&self.temperature_2m_min, i),
                temperature_mean_c: at(&self.temperature_2m_mean, i),
                humidity_percent: at(&self.relative_humidity_2m_mean, i),
            })
            .collect()
    }
}

impl OpenMeteoClient {
    /// Create a new OpenMeteoClient
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, "https://archive-api.open-meteo.com/v1/archive".to_string())
    }

    /// Create a new OpenMeteoClient with custom base URL (for testing)
    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Fetch daily weather for the `days` days ending at `end_date`
    pub async fn get_daily_weather(
        &self,
        latitude: f64,
        longitude: f64,
        end_date: NaiveDate,
        days: i64,
    ) -> AppResult<Vec<DailyWeather>> {
        let start_date = end_date - Duration::days(days.max(1) - 1);
        let url = format!(
            "{}?latitude={}&longitude={}&start_date={}&end_date={}&daily={}&timezone=auto",
            self.base_url, latitude, longitude, start_date, end_date, DAILY_VARIABLES
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Open-Meteo request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Open-Meteo error: {} - {}",
                status, body
            )));
        }

        let data: OpenMeteoResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Failed to parse Open-Meteo response: {}", e)))?;

        Ok(data.daily.into_days())
    }
}

#[async_trait]
impl ReadingsSource for OpenMeteoClient {
    fn name(&self) -> &'static str {
        "open-meteo"
    }

    async fn fetch(&self, query: &ReadingsQuery) -> AppResult<RawFeatures> {
        let days = self
            .get_daily_weather(query.latitude, query.longitude, query.end_date, query.days)
            .await?;
        Ok(summarize_daily_weather(&days))
    }
}
