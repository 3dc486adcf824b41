//! WebAssembly module for the Agri-Siddhi yield service
//!
//! Provides client-side computation for the field app:
//! - Feature normalization of offline readings
//! - Recommendations for a known yield estimate
//! - Baseline lookups and input validation

use chrono::NaiveDate;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::features::*;
pub use shared::recommendation::*;
pub use shared::validation::*;

use shared::{default_districts, find_district, nearest_district, AgroSeason};

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::log_1(&JsValue::from_str("agri-siddhi wasm ready"));
}

fn parse_date(value: Option<String>, name: &str) -> Result<Option<NaiveDate>, String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                .map_err(|e| format!("Invalid {}: {}", name, e))
        })
        .transpose()
}

fn normalize_json(
    raw_json: &str,
    planting_date: Option<String>,
    reference_date: Option<String>,
) -> Result<String, String> {
    let raw: RawFeatures =
        serde_json::from_str(raw_json).map_err(|e| format!("Invalid features JSON: {}", e))?;
    let temporal = TemporalContext::new(
        parse_date(planting_date, "planting_date")?,
        parse_date(reference_date, "reference_date")?,
    );
    let normalized = FeatureNormalizer::new().normalize(&raw, &temporal);
    serde_json::to_string(&normalized).map_err(|e| e.to_string())
}

/// Normalize raw readings into the model's feature vector.
///
/// Returns `{vector, defaulted, completeness}` as JSON.
#[wasm_bindgen]
pub fn normalize_features(
    raw_json: &str,
    planting_date: Option<String>,
    reference_date: Option<String>,
) -> Result<String, JsValue> {
    normalize_json(raw_json, planting_date, reference_date).map_err(|e| JsValue::from_str(&e))
}

fn recommendations_json(raw_json: &str, predicted_yield: f64, baseline_yield: f64) -> Result<String, String> {
    let raw: RawFeatures =
        serde_json::from_str(raw_json).map_err(|e| format!("Invalid features JSON: {}", e))?;
    let normalized = FeatureNormalizer::new().normalize(&raw, &TemporalContext::default());
    let recommendations = RecommendationEngine::default().recommend(&normalized.vector, predicted_yield, baseline_yield);
    serde_json::to_string(&recommendations).map_err(|e| e.to_string())
}

/// Recommendations for raw readings and a yield estimate, as a JSON array
#[wasm_bindgen]
pub fn generate_recommendations(
    raw_json: &str,
    predicted_yield: f64,
    baseline_yield: f64,
) -> Result<String, JsValue> {
    recommendations_json(raw_json, predicted_yield, baseline_yield).map_err(|e| JsValue::from_str(&e))
}

/// Percentage difference between a prediction and the district baseline
#[wasm_bindgen]
pub fn compare_to_baseline(predicted_yield: f64, baseline_yield: f64) -> f64 {
    yield_vs_average_percent(predicted_yield, baseline_yield)
}

/// Historical baseline for a district; falls back to `fallback` when unknown
#[wasm_bindgen]
pub fn district_baseline(name: &str, fallback: f64) -> f64 {
    find_district(&default_districts(), name)
        .map(|d| d.base_yield_kg_per_ha)
        .unwrap_or(fallback)
}

/// Name of the district closest to a GPS fix
#[wasm_bindgen]
pub fn nearest_district_name(latitude: f64, longitude: f64) -> Option<String> {
    nearest_district(&default_districts(), latitude, longitude).map(|d| d.name.clone())
}

/// Cropping season (Kharif, Rabi, Summer) for a calendar month
#[wasm_bindgen]
pub fn agro_season(month: u32) -> String {
    AgroSeason::from_month(month).name().to_string()
}

/// Validate a soil pH reading before it is queued for sync
#[wasm_bindgen]
pub fn is_valid_soil_ph(ph: f64) -> bool {
    validate_soil_ph(ph).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fills_defaults() {
        let json = normalize_json(r#"{"rainfall": 620, "soil_moisture": "35"}"#, None, None).unwrap();
        let normalized: NormalizedFeatures = serde_json::from_str(&json).unwrap();

        assert_eq!(normalized.vector.get(FeatureField::TotalRainfall), 620.0);
        assert_eq!(normalized.vector.get(FeatureField::SoilMoisture), 35.0);
        assert!(normalized.defaulted.contains(&FeatureField::SoilPh));
        assert!(normalized.completeness > 0.0 && normalized.completeness < 1.0);
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(normalize_json("not json", None, None).is_err());
        assert!(normalize_json("{}", Some("2024-13-01".into()), None).is_err());
    }

    #[test]
    fn test_dry_field_gets_irrigation_first() {
        let json = recommendations_json(r#"{"soil_moisture": 12}"#, 3000.0, 3500.0).unwrap();
        let recs: Vec<Recommendation> = serde_json::from_str(&json).unwrap();
        assert_eq!(recs[0].kind, RecommendationType::Irrigation);
        assert!(recs.windows(2).all(|w| w[0].priority <= w[1].priority));
    }

    #[test]
    fn test_district_lookups() {
        assert_eq!(district_baseline("thanjavur", 3200.0), 4000.0);
        assert_eq!(district_baseline("Atlantis", 3200.0), 3200.0);
        assert_eq!(nearest_district_name(13.05, 80.25).as_deref(), Some("Chennai"));
        assert_eq!(agro_season(7), "Kharif");
    }

    #[test]
    fn test_baseline_comparison() {
        assert_eq!(compare_to_baseline(4400.0, 4000.0).round(), 10.0);
        assert!(is_valid_soil_ph(6.5));
        assert!(!is_valid_soil_ph(15.0));
    }
}
