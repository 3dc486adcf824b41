//! Rule-based agronomic recommendations
//!
//! Threshold rules over the latest soil and weather readings, followed by
//! generic tips chosen from the ratio of predicted to baseline yield.
//! Pure and deterministic so the same logic runs on the server and in the
//! browser.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::features::{FeatureField, FeatureVector};

/// Category of a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Irrigation,
    Fertilizer,
    Pest,
    CropManagement,
}

/// One actionable recommendation. Priority 1 is the most urgent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub text: String,
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_impact: Option<String>,
}

impl Recommendation {
    fn new(kind: RecommendationType, priority: u8, text: &str, impact: Option<&str>) -> Self {
        Self {
            kind,
            text: text.to_string(),
            priority,
            scheduled_date: None,
            estimated_impact: impact.map(str::to_string),
        }
    }
}

/// Estimated-impact text per rule. Deployments override these from config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactTemplates {
    pub irrigation_increase: String,
    pub irrigation_decrease: String,
    pub lime: String,
    pub sulfur: String,
    pub nitrogen: String,
    pub phosphorus: String,
    pub potassium: String,
    pub heat_stress: String,
}

impl Default for ImpactTemplates {
    fn default() -> Self {
        Self {
            irrigation_increase: "Increase yield by 5-10%".to_string(),
            irrigation_decrease: "Prevent yield loss of 3-5%".to_string(),
            lime: "Improve nutrient availability, increase yield by 8-12%".to_string(),
            sulfur: "Improve nutrient uptake, increase yield by 5-8%".to_string(),
            nitrogen: "Increase yield by 10-15%".to_string(),
            phosphorus: "Improve root development, increase yield by 5-8%".to_string(),
            potassium: "Improve disease resistance, increase yield by 3-5%".to_string(),
            heat_stress: "Prevent heat stress and yield loss".to_string(),
        }
    }
}

/// Rule thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationThresholds {
    pub moisture_low: f64,
    pub moisture_high: f64,
    pub ph_low: f64,
    pub ph_high: f64,
    pub nitrogen_low: f64,
    pub phosphorus_low: f64,
    pub potassium_low: f64,
    pub heat_stress_temperature: f64,
    pub high_yield_ratio: f64,
    pub low_yield_ratio: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            moisture_low: 20.0,
            moisture_high: 80.0,
            ph_low: 6.0,
            ph_high: 8.0,
            nitrogen_low: 30.0,
            phosphorus_low: 15.0,
            potassium_low: 100.0,
            heat_stress_temperature: 35.0,
            high_yield_ratio: 1.1,
            low_yield_ratio: 0.9,
        }
    }
}

/// Ratio of predicted to baseline yield; 1.0 when the baseline is unusable
pub fn yield_ratio(predicted_yield: f64, baseline_yield: f64) -> f64 {
    if baseline_yield > 0.0 && baseline_yield.is_finite() && predicted_yield.is_finite() {
        predicted_yield / baseline_yield
    } else {
        1.0
    }
}

/// Percentage difference from an average yield, e.g. 10.0 for +10%
pub fn yield_vs_average_percent(predicted_yield: f64, average_yield: f64) -> f64 {
    (yield_ratio(predicted_yield, average_yield) - 1.0) * 100.0
}

const PRIORITY_TIP: u8 = 3;
const PRIORITY_GENERAL: u8 = 4;

/// Deterministic recommendation generator
#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    thresholds: RecommendationThresholds,
    impacts: ImpactTemplates,
}

impl RecommendationEngine {
    pub fn new(thresholds: RecommendationThresholds, impacts: ImpactTemplates) -> Self {
        Self { thresholds, impacts }
    }

    pub fn with_impacts(impacts: ImpactTemplates) -> Self {
        Self {
            thresholds: RecommendationThresholds::default(),
            impacts,
        }
    }

    pub fn thresholds(&self) -> &RecommendationThresholds {
        &self.thresholds
    }

    /// Recommendations sorted by ascending priority. Rules of equal priority
    /// keep their rule order.
    pub fn recommend(
        &self,
        features: &FeatureVector,
        predicted_yield: f64,
        baseline_yield: f64,
    ) -> Vec<Recommendation> {
        let mut recommendations = self.threshold_rules(features);
        recommendations.extend(self.yield_tips(yield_ratio(predicted_yield, baseline_yield)));
        recommendations.extend(general_tips());
        recommendations.sort_by_key(|r| r.priority);
        recommendations
    }

    fn threshold_rules(&self, features: &FeatureVector) -> Vec<Recommendation> {
        use RecommendationType::{Fertilizer, Irrigation};

        let t = &self.thresholds;
        let i = &self.impacts;
        let mut out = Vec::new();

        let moisture = features.get(FeatureField::SoilMoisture);
        if moisture < t.moisture_low {
            out.push(Recommendation::new(
                Irrigation,
                1,
                "Soil moisture is low. Irrigate with 20-30mm of water.",
                Some(i.irrigation_increase.as_str()),
            ));
        } else if moisture > t.moisture_high {
            out.push(Recommendation::new(
                Irrigation,
                2,
                "Soil moisture is high. Reduce irrigation to prevent waterlogging.",
                Some(i.irrigation_decrease.as_str()),
            ));
        }

        let ph = features.get(FeatureField::SoilPh);
        if ph < t.ph_low {
            out.push(Recommendation::new(
                Fertilizer,
                2,
                "Soil is acidic. Apply agricultural lime to raise pH to 6.5-7.0.",
                Some(i.lime.as_str()),
            ));
        } else if ph > t.ph_high {
            out.push(Recommendation::new(
                Fertilizer,
                2,
                "Soil is alkaline. Apply sulfur or organic matter to lower pH.",
                Some(i.sulfur.as_str()),
            ));
        }

        if features.get(FeatureField::Nitrogen) < t.nitrogen_low {
            out.push(Recommendation::new(
                Fertilizer,
                1,
                "Nitrogen levels are low. Apply 15-20kg N per hectare.",
                Some(i.nitrogen.as_str()),
            ));
        }
        if features.get(FeatureField::Phosphorus) < t.phosphorus_low {
            out.push(Recommendation::new(
                Fertilizer,
                2,
                "Phosphorus levels are low. Apply 10-15kg P per hectare.",
                Some(i.phosphorus.as_str()),
            ));
        }
        if features.get(FeatureField::Potassium) < t.potassium_low {
            out.push(Recommendation::new(
                Fertilizer,
                2,
                "Potassium levels are low. Apply 20-25kg K per hectare.",
                Some(i.potassium.as_str()),
            ));
        }

        if features.get(FeatureField::AvgTemperature) > t.heat_stress_temperature {
            out.push(Recommendation::new(
                Irrigation,
                1,
                "High temperatures detected. Increase irrigation frequency.",
                Some(i.heat_stress.as_str()),
            ));
        }

        out
    }

    fn yield_tips(&self, ratio: f64) -> Vec<Recommendation> {
        use RecommendationType::{CropManagement, Pest};

        let tip = |kind: RecommendationType, text: &'static str| {
            Recommendation::new(kind, PRIORITY_TIP, text, None)
        };
        if ratio > self.thresholds.high_yield_ratio {
            vec![
                tip(CropManagement, "High yield potential detected - ensure adequate water supply during critical growth stages"),
                tip(CropManagement, "Consider increasing plant density for maximum yield realization"),
                tip(Pest, "Monitor for pest and disease pressure due to dense canopy"),
            ]
        } else if ratio < self.thresholds.low_yield_ratio {
            vec![
                tip(CropManagement, "Lower yield expected - focus on cost optimization"),
                tip(CropManagement, "Consider drought-resistant varieties for future seasons"),
                tip(CropManagement, "Implement water conservation techniques"),
            ]
        } else {
            vec![
                tip(CropManagement, "Normal yield potential - maintain standard management practices"),
                tip(CropManagement, "Monitor weather conditions closely"),
                tip(CropManagement, "Ensure timely application of inputs"),
            ]
        }
    }
}

fn general_tips() -> Vec<Recommendation> {
    [
        "Regular soil testing helps optimize fertilizer use",
        "Use weather forecasts for irrigation planning",
        "Consider crop insurance for risk mitigation",
    ]
    .into_iter()
    .map(|text| Recommendation::new(RecommendationType::CropManagement, PRIORITY_GENERAL, text, None))
    .collect()
}
