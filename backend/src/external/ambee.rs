//! Ambee soil API client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared::{FeatureField, RawFeatures};

use super::provider::{ReadingsQuery, ReadingsSource};
use crate::error::{AppError, AppResult};

/// Organic matter to organic carbon (Van Bemmelen factor)
const ORGANIC_MATTER_PER_CARBON: f64 = 1.724;

/// Ambee soil API client
#[derive(Clone)]
pub struct AmbeeSoilClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AmbeeSoilResponse {
    #[serde(default)]
    data: Vec<AmbeeSoilReading>,
}

#[derive(Debug, Default, Deserialize)]
struct AmbeeSoilReading {
    ph: Option<f64>,
    organic_matter_percent: Option<f64>,
    nitrogen_kg_per_ha: Option<f64>,
    soil_moisture: Option<f64>,
}

impl AmbeeSoilReading {
    fn into_raw(self) -> RawFeatures {
        let mut raw = RawFeatures::new();
        let mut put = |field: FeatureField, value: Option<f64>| {
            if let Some(v) = value {
                raw.insert(field.name(), v);
            }
        };
        put(FeatureField::SoilPh, self.ph);
        put(
            FeatureField::OrganicCarbon,
            self.organic_matter_percent.map(|om| om / ORGANIC_MATTER_PER_CARBON),
        );
        put(FeatureField::Nitrogen, self.nitrogen_kg_per_ha);
        put(FeatureField::SoilMoisture, self.soil_moisture);
        raw
    }
}

impl AmbeeSoilClient {
    /// Create a new AmbeeSoilClient
    pub fn new(client: Client, api_key: String) -> Self {
        Self::with_base_url(client, api_key, "https://api.ambeedata.com".to_string())
    }

    /// Create a new AmbeeSoilClient with custom base URL (for testing)
    pub fn with_base_url(client: Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
        }
    }

    /// Fetch the latest soil reading near the coordinates
    pub async fn get_soil(&self, latitude: f64, longitude: f64) -> AppResult<RawFeatures> {
        let url = format!(
            "{}/latest/soil/by-lat-lng?lat={}&lng={}",
            self.base_url, latitude, longitude
        );

        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("Content-type", "application/json")
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Ambee request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!("Ambee error: {} - {}", status, body)));
        }

        let data: AmbeeSoilResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Failed to parse Ambee response: {}", e)))?;

        Ok(data.data.into_iter().next().unwrap_or_default().into_raw())
    }
}

#[async_trait]
impl ReadingsSource for AmbeeSoilClient {
    fn name(&self) -> &'static str {
        "ambee-soil"
    }

    async fn fetch(&self, query: &ReadingsQuery) -> AppResult<RawFeatures> {
        self.get_soil(query.latitude, query.longitude).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_soil_fields() {
        let body = r#"{"message":"success","data":[{"ph":6.4,"organic_matter_percent":1.724,"soil_moisture":31.5}]}"#;
        let response: AmbeeSoilResponse = serde_json::from_str(body).unwrap();
        let raw = response.data.into_iter().next().unwrap().into_raw();

        assert_eq!(raw.number("soil_ph"), Some(6.4));
        assert!((raw.number("organic_carbon").unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(raw.number("soil_moisture"), Some(31.5));
        assert_eq!(raw.number("nitrogen"), None);
    }

    #[test]
    fn test_empty_data_yields_no_readings() {
        let response: AmbeeSoilResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(response.data.into_iter().next().unwrap_or_default().into_raw().is_empty());
    }
}
