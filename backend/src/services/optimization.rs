//! Fertilizer and irrigation planning
//!
//! Pure calculations over the normalized features and a predicted yield.
//! Fertilizer rates start from fixed N/P/K baselines and are scaled by soil
//! status and by the predicted yield relative to the district baseline.
//! Irrigation uses a one-step water balance with a Hargreaves-style ET0.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{yield_ratio, FeatureField, FeatureVector};

/// Yield ratio above which rates are raised
const HIGH_YIELD_RATIO: f64 = 1.1;
/// Yield ratio below which rates are trimmed
const LOW_YIELD_RATIO: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Nitrogen,
    Phosphorus,
    Potassium,
}

impl Nutrient {
    fn name(self) -> &'static str {
        match self {
            Nutrient::Nitrogen => "nitrogen",
            Nutrient::Phosphorus => "phosphorus",
            Nutrient::Potassium => "potassium",
        }
    }

    fn soil_field(self) -> FeatureField {
        match self {
            Nutrient::Nitrogen => FeatureField::Nitrogen,
            Nutrient::Phosphorus => FeatureField::Phosphorus,
            Nutrient::Potassium => FeatureField::Potassium,
        }
    }
}

/// Soil status bands and the factors applied in each
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientRule {
    pub baseline_kg_per_ha: f64,
    pub low_below: f64,
    pub low_factor: f64,
    pub high_above: f64,
    pub high_factor: f64,
    pub high_yield_factor: f64,
    pub low_yield_factor: f64,
    /// INR per kg of product
    pub price_inr_per_kg: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientPlan {
    pub amount_kg_per_ha: f64,
    pub adjustment_factor: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStep {
    pub nutrient: Nutrient,
    pub stage: String,
    pub share: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerPlan {
    pub nitrogen: NutrientPlan,
    pub phosphorus: NutrientPlan,
    pub potassium: NutrientPlan,
    pub total_cost_inr: Decimal,
    pub application_timing: Vec<ApplicationStep>,
    pub notes: Vec<String>,
}

// ============================================================================
// Irrigation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropStage {
    Initial,
    #[default]
    Development,
    MidSeason,
    LateSeason,
}

impl CropStage {
    /// Crop coefficient (Kc)
    pub fn crop_coefficient(self) -> f64 {
        match self {
            CropStage::Initial => 0.4,
            CropStage::Development => 0.7,
            CropStage::MidSeason => 1.0,
            CropStage::LateSeason => 0.8,
        }
    }

    /// Relative moisture below which irrigation is due
    pub fn moisture_threshold(self) -> f64 {
        match self {
            CropStage::Initial => 0.3,
            CropStage::Development => 0.4,
            CropStage::MidSeason => 0.5,
            CropStage::LateSeason => 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrrigationPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigationTiming {
    Immediate,
    NotNeeded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationSchedule {
    pub crop_stage: CropStage,
    /// Relative soil moisture in [0, 1]
    pub current_moisture_level: f64,
    pub irrigation_needed: bool,
    pub recommended_amount_mm: f64,
    pub timing: IrrigationTiming,
    pub priority: IrrigationPriority,
    pub critical_periods: Vec<String>,
    pub water_saving_tips: Vec<String>,
}

/// Reference evapotranspiration in mm/day from mean air temperature
pub fn reference_et0(avg_temperature_c: f64) -> f64 {
    0.0023 * (avg_temperature_c + 17.8) * (avg_temperature_c - 5.0).max(0.0).sqrt()
}

/// Relative soil moisture after rainfall and crop water use
pub fn soil_moisture_level(rainfall_mm: f64, avg_temperature_c: f64, stage: CropStage) -> f64 {
    let etc = reference_et0(avg_temperature_c) * stage.crop_coefficient();
    round_to((0.5 + (rainfall_mm - etc) / 100.0).clamp(0.0, 1.0), 2)
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or_default()
}

const CRITICAL_PERIODS: [&str; 4] = [
    "Transplanting to establishment (0-15 DAS)",
    "Panicle initiation (45-50 DAS)",
    "Flowering (70-80 DAS)",
    "Grain filling (80-100 DAS)",
];

const WATER_SAVING_TIPS: [&str; 5] = [
    "Use alternate wetting and drying (AWD) technique",
    "Maintain shallow water depth (2-3 cm)",
    "Avoid continuous flooding during vegetative stage",
    "Monitor soil moisture regularly",
    "Use mulching to reduce evaporation",
];

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationEngine {
    pub nitrogen: NutrientRule,
    pub phosphorus: NutrientRule,
    pub potassium: NutrientRule,
}

impl Default for OptimizationEngine {
    fn default() -> Self {
        Self {
            nitrogen: NutrientRule {
                baseline_kg_per_ha: 120.0,
                low_below: 50.0,
                low_factor: 1.2,
                high_above: 150.0,
                high_factor: 0.8,
                high_yield_factor: 1.15,
                low_yield_factor: 0.9,
                price_inr_per_kg: Decimal::from(25),
            },
            phosphorus: NutrientRule {
                baseline_kg_per_ha: 60.0,
                low_below: 10.0,
                low_factor: 1.3,
                high_above: 30.0,
                high_factor: 0.7,
                high_yield_factor: 1.1,
                low_yield_factor: 0.85,
                price_inr_per_kg: Decimal::from(35),
            },
            potassium: NutrientRule {
                baseline_kg_per_ha: 40.0,
                low_below: 100.0,
                low_factor: 1.25,
                high_above: 200.0,
                high_factor: 0.8,
                high_yield_factor: 1.1,
                low_yield_factor: 0.9,
                price_inr_per_kg: Decimal::from(30),
            },
        }
    }
}

impl OptimizationEngine {
    fn rule(&self, nutrient: Nutrient) -> &NutrientRule {
        match nutrient {
            Nutrient::Nitrogen => &self.nitrogen,
            Nutrient::Phosphorus => &self.phosphorus,
            Nutrient::Potassium => &self.potassium,
        }
    }

    /// Rate for one nutrient given its soil level and the yield ratio
    pub fn nutrient_plan(&self, nutrient: Nutrient, soil_level: f64, ratio: f64) -> NutrientPlan {
        let rule = self.rule(nutrient);
        let (mut factor, reasoning) = if soil_level < rule.low_below {
            (
                rule.low_factor,
                format!("Soil {} is low - increased application recommended", nutrient.name()),
            )
        } else if soil_level > rule.high_above {
            (
                rule.high_factor,
                format!("Soil {} is high - reduced application to avoid waste", nutrient.name()),
            )
        } else {
            (
                1.0,
                format!("Soil {} is adequate - standard application rate", nutrient.name()),
            )
        };

        if ratio > HIGH_YIELD_RATIO {
            factor *= rule.high_yield_factor;
        } else if ratio < LOW_YIELD_RATIO {
            factor *= rule.low_yield_factor;
        }

        NutrientPlan {
            amount_kg_per_ha: round_to(rule.baseline_kg_per_ha * factor, 1),
            adjustment_factor: round_to(factor, 2),
            reasoning,
        }
    }

    pub fn fertilizer_plan(
        &self,
        features: &FeatureVector,
        predicted_yield: f64,
        baseline_yield: f64,
    ) -> FertilizerPlan {
        let ratio = yield_ratio(predicted_yield, baseline_yield);
        let plan = |n: Nutrient| self.nutrient_plan(n, features.get(n.soil_field()), ratio);
        let (nitrogen, phosphorus, potassium) = (
            plan(Nutrient::Nitrogen),
            plan(Nutrient::Phosphorus),
            plan(Nutrient::Potassium),
        );

        let total_cost_inr = [
            (Nutrient::Nitrogen, &nitrogen),
            (Nutrient::Phosphorus, &phosphorus),
            (Nutrient::Potassium, &potassium),
        ]
        .iter()
        .map(|(n, p)| to_decimal(p.amount_kg_per_ha) * self.rule(*n).price_inr_per_kg)
        .sum::<Decimal>()
        .round_dp(0);

        FertilizerPlan {
            nitrogen,
            phosphorus,
            potassium,
            total_cost_inr,
            application_timing: application_timing(),
            notes: fertilizer_notes(features, ratio),
        }
    }

    pub fn irrigation_schedule(&self, features: &FeatureVector, stage: CropStage) -> IrrigationSchedule {
        let moisture = soil_moisture_level(
            features.get(FeatureField::TotalRainfall),
            features.get(FeatureField::AvgTemperature),
            stage,
        );
        let (amount, timing, priority) = irrigation_need(moisture, stage);

        IrrigationSchedule {
            crop_stage: stage,
            current_moisture_level: moisture,
            irrigation_needed: timing == IrrigationTiming::Immediate,
            recommended_amount_mm: amount,
            timing,
            priority,
            critical_periods: CRITICAL_PERIODS.iter().map(|s| s.to_string()).collect(),
            water_saving_tips: WATER_SAVING_TIPS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Amount in mm, timing and priority for a moisture level at `stage`
fn irrigation_need(moisture: f64, stage: CropStage) -> (f64, IrrigationTiming, IrrigationPriority) {
    let threshold = stage.moisture_threshold();
    if moisture >= threshold {
        return (0.0, IrrigationTiming::NotNeeded, IrrigationPriority::Low);
    }
    let priority = if moisture < threshold * 0.7 {
        IrrigationPriority::High
    } else {
        IrrigationPriority::Medium
    };
    (round_to((threshold - moisture) * 50.0, 1), IrrigationTiming::Immediate, priority)
}

fn application_timing() -> Vec<ApplicationStep> {
    let step = |nutrient, stage: &str, share: &str| ApplicationStep {
        nutrient,
        stage: stage.to_string(),
        share: share.to_string(),
    };
    vec![
        step(Nutrient::Nitrogen, "basal", "25% at transplanting"),
        step(Nutrient::Nitrogen, "top_dress_1", "35% at tillering (25-30 DAS)"),
        step(Nutrient::Nitrogen, "top_dress_2", "40% at panicle initiation (45-50 DAS)"),
        step(Nutrient::Phosphorus, "basal", "100% at transplanting"),
        step(Nutrient::Potassium, "basal", "50% at transplanting"),
        step(Nutrient::Potassium, "top_dress", "50% at panicle initiation"),
    ]
}

fn fertilizer_notes(features: &FeatureVector, ratio: f64) -> Vec<String> {
    let mut notes = Vec::new();
    if ratio > HIGH_YIELD_RATIO {
        notes.push("High yield potential predicted - consider increasing fertilizer rates".to_string());
    } else if ratio < LOW_YIELD_RATIO {
        notes.push("Lower yield expected - optimize fertilizer use to reduce costs".to_string());
    }

    let ph = features.get(FeatureField::SoilPh);
    if ph < 6.5 {
        notes.push("Soil pH is low - consider lime application".to_string());
    } else if ph > 8.0 {
        notes.push("Soil pH is high - consider sulfur application".to_string());
    }

    if features.get(FeatureField::OrganicCarbon) < 0.5 {
        notes.push("Low organic carbon - consider organic manure application".to_string());
    }
    notes
}
