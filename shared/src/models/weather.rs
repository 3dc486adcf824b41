//! Weather observation models and aggregation into the weather band

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::features::{FeatureField, RawFeatures};

/// Daily maximum above which a day counts as heat stress, in Celsius
pub const HEAT_STRESS_THRESHOLD_C: f64 = 35.0;

/// Daily rainfall below which a day counts as dry, in mm
pub const DRY_DAY_THRESHOLD_MM: f64 = 1.0;

/// Consecutive dry days that make a dry spell
pub const DRY_SPELL_MIN_DAYS: usize = 3;

/// One day of observed weather
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
    pub date: NaiveDate,
    pub precipitation_mm: Option<f64>,
    pub temperature_max_c: Option<f64>,
    pub temperature_min_c: Option<f64>,
    pub temperature_mean_c: Option<f64>,
    pub humidity_percent: Option<f64>,
}

/// Number of runs of at least three consecutive dry days
pub fn count_dry_spells(daily_rainfall_mm: &[f64]) -> usize {
    let mut spells = 0;
    let mut run = 0;
    for rain in daily_rainfall_mm {
        if *rain < DRY_DAY_THRESHOLD_MM {
            run += 1;
        } else {
            if run >= DRY_SPELL_MIN_DAYS {
                spells += 1;
            }
            run = 0;
        }
    }
    if run >= DRY_SPELL_MIN_DAYS {
        spells += 1;
    }
    spells
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Aggregate daily observations into weather-band raw features.
///
/// Fields without any observations are left out so the normalizer defaults them.
pub fn summarize_daily_weather(days: &[DailyWeather]) -> RawFeatures {
    let mut raw = RawFeatures::new();
    if days.is_empty() {
        return raw;
    }

    let rain: Vec<f64> = days.iter().filter_map(|d| d.precipitation_mm).collect();
    let maxima: Vec<f64> = days.iter().filter_map(|d| d.temperature_max_c).collect();
    let minima: Vec<f64> = days.iter().filter_map(|d| d.temperature_min_c).collect();
    let means: Vec<f64> = days
        .iter()
        .filter_map(|d| {
            d.temperature_mean_c.or(match (d.temperature_max_c, d.temperature_min_c) {
                (Some(hi), Some(lo)) => Some((hi + lo) / 2.0),
                _ => None,
            })
        })
        .collect();
    let humidity: Vec<f64> = days.iter().filter_map(|d| d.humidity_percent).collect();

    if let Some(avg_rain) = mean(&rain) {
        let variance = rain.iter().map(|r| (r - avg_rain).powi(2)).sum::<f64>() / rain.len() as f64;
        raw.insert(FeatureField::TotalRainfall.name(), rain.iter().sum());
        raw.insert(FeatureField::RainfallVariance.name(), variance);
        raw.insert(FeatureField::DrySpellCount.name(), count_dry_spells(&rain) as f64);
    }
    if let Some(avg) = mean(&means) {
        raw.insert(FeatureField::AvgTemperature.name(), avg);
    }
    if !maxima.is_empty() {
        let hottest = maxima.iter().copied().fold(f64::MIN, f64::max);
        let heat_days = maxima.iter().filter(|t| **t > HEAT_STRESS_THRESHOLD_C).count();
        raw.insert(FeatureField::MaxTemperature.name(), hottest);
        raw.insert(FeatureField::HeatStressDays.name(), heat_days as f64);
    }
    if !minima.is_empty() {
        let coldest = minima.iter().copied().fold(f64::MAX, f64::min);
        raw.insert(FeatureField::MinTemperature.name(), coldest);
    }
    if let Some(h) = mean(&humidity) {
        raw.insert(FeatureField::Humidity.name(), h);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32, rain: f64, hi: f64, lo: f64) -> DailyWeather {
        DailyWeather {
            date: NaiveDate::from_ymd_opt(2024, 7, d).unwrap(),
            precipitation_mm: Some(rain),
            temperature_max_c: Some(hi),
            temperature_min_c: Some(lo),
            temperature_mean_c: None,
            humidity_percent: Some(70.0),
        }
    }

    #[test]
    fn test_dry_spells() {
        assert_eq!(count_dry_spells(&[0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 2.0]), 1);
        assert_eq!(count_dry_spells(&[0.0, 0.5, 0.9, 0.0]), 1);
        assert_eq!(count_dry_spells(&[3.0, 0.0, 0.0, 4.0]), 0);
        assert_eq!(count_dry_spells(&[]), 0);
    }

    #[test]
    fn test_summary_fields() {
        let days = vec![day(1, 10.0, 36.0, 24.0), day(2, 0.0, 34.0, 22.0), day(3, 20.0, 37.0, 25.0)];
        let raw = summarize_daily_weather(&days);
        assert_eq!(raw.number("total_rainfall"), Some(30.0));
        assert_eq!(raw.number("max_temperature"), Some(37.0));
        assert_eq!(raw.number("min_temperature"), Some(22.0));
        assert_eq!(raw.number("heat_stress_days"), Some(2.0));
        assert_eq!(raw.number("avg_temperature"), Some(29.666666666666668));
        assert!((raw.number("rainfall_variance").unwrap() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_history_leaves_defaults() {
        assert!(summarize_daily_weather(&[]).is_empty());
    }
}
