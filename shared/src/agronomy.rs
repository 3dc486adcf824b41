//! Agronomic yield response curves
//!
//! A response curve turns one feature value into a yield multiplier. The
//! synthetic label generator multiplies them together on top of a district's
//! base yield.

use serde::{Deserialize, Serialize};

use crate::features::{FeatureField, FeatureVector};

/// Piecewise-linear yield multiplier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseCurve {
    /// 1.0 inside `[low, high]`, falling by `rate` per unit of distance from
    /// the nearest edge, never below `floor`
    Band {
        low: f64,
        high: f64,
        rate: f64,
        floor: f64,
    },
    /// `value / reference` clamped to `[min, max]`
    Ramp { reference: f64, min: f64, max: f64 },
}

impl ResponseCurve {
    pub fn band(low: f64, high: f64, rate: f64) -> Self {
        ResponseCurve::Band {
            low,
            high,
            rate,
            floor: 0.5,
        }
    }

    pub fn ramp(reference: f64, min: f64, max: f64) -> Self {
        ResponseCurve::Ramp { reference, min, max }
    }

    pub fn multiplier(&self, value: f64) -> f64 {
        match *self {
            ResponseCurve::Band {
                low,
                high,
                rate,
                floor,
            } => {
                let distance = if value < low {
                    low - value
                } else if value > high {
                    value - high
                } else {
                    0.0
                };
                (1.0 - distance * rate).max(floor)
            }
            ResponseCurve::Ramp { reference, min, max } => {
                if reference <= 0.0 {
                    return 1.0;
                }
                (value / reference).clamp(min, max)
            }
        }
    }
}

/// Set of per-feature response curves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldResponse {
    pub curves: Vec<(FeatureField, ResponseCurve)>,
}

impl Default for YieldResponse {
    fn default() -> Self {
        Self {
            curves: vec![
                (FeatureField::SoilMoisture, ResponseCurve::band(40.0, 60.0, 0.01)),
                (FeatureField::SoilPh, ResponseCurve::band(6.5, 7.0, 0.1)),
                (FeatureField::AvgTemperature, ResponseCurve::band(25.0, 30.0, 0.02)),
                (FeatureField::Humidity, ResponseCurve::band(60.0, 80.0, 0.005)),
                (FeatureField::TotalRainfall, ResponseCurve::ramp(600.0, 0.6, 1.2)),
                (FeatureField::OrganicCarbon, ResponseCurve::ramp(2.0, 0.5, 1.2)),
                (FeatureField::Nitrogen, ResponseCurve::ramp(120.0, 0.5, 1.3)),
                (FeatureField::PeakNdvi, ResponseCurve::ramp(0.6, 0.5, 1.2)),
                (FeatureField::PeakEvi, ResponseCurve::ramp(0.4, 0.5, 1.1)),
            ],
        }
    }
}

impl YieldResponse {
    /// Curve registered for a field, if any
    pub fn curve(&self, field: FeatureField) -> Option<&ResponseCurve> {
        self.curves.iter().find(|(f, _)| *f == field).map(|(_, c)| c)
    }

    /// Multiplier for a single field; 1.0 when no curve is registered
    pub fn multiplier(&self, field: FeatureField, value: f64) -> f64 {
        self.curve(field).map_or(1.0, |c| c.multiplier(value))
    }

    /// Product of every curve's multiplier
    pub fn combined_multiplier(&self, features: &FeatureVector) -> f64 {
        self.curves
            .iter()
            .map(|(field, curve)| curve.multiplier(features.get(*field)))
            .product()
    }
}
