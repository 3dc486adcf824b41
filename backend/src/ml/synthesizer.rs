//! Synthetic training data
//!
//! Generates plausible paddy observations for the pilot districts when no
//! labelled field data is available. Weather follows the agro-season, soil
//! chemistry follows the soil family, and the label is the district's base
//! yield scaled by the agronomic response curves plus multiplicative noise.

use chrono::{NaiveDate, TimeZone, Utc};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use shared::{
    default_districts, season_code_for_month, AgroSeason, District, FeatureField, FeatureVector,
    SampleContext, SoilFamily, SoilType, YieldResponse,
};

use super::dataset::TrainingSample;
use super::error::MlError;

/// Mean and standard deviation of a normally distributed reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    pub mean: f64,
    pub std: f64,
}

const fn normal(mean: f64, std: f64) -> Gaussian {
    Gaussian { mean, std }
}

/// Weather regime of one agro-season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonRegime {
    pub season: AgroSeason,
    pub rainfall_mm: Gaussian,
    pub avg_temperature_c: Gaussian,
    pub humidity_percent: Gaussian,
    pub heat_stress_days: Gaussian,
    pub dry_spells: Gaussian,
}

/// Soil chemistry regime of one soil family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilRegime {
    pub family: SoilFamily,
    pub ph: Gaussian,
    pub organic_carbon: Gaussian,
    pub nitrogen: Gaussian,
}

/// Everything that shapes the synthetic distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub districts: Vec<District>,
    pub seasons: Vec<SeasonRegime>,
    pub soil_types: Vec<SoilType>,
    pub soils: Vec<SoilRegime>,
    pub response: YieldResponse,
    /// Standard deviation of the multiplicative label noise around 1.0
    pub noise_std: f64,
    pub yield_floor: f64,
    pub yield_ceiling: f64,
    /// First calendar year observations are spread over
    pub start_year: i32,
    pub years: i32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            districts: default_districts(),
            seasons: vec![
                SeasonRegime {
                    season: AgroSeason::Kharif,
                    rainfall_mm: normal(800.0, 200.0),
                    avg_temperature_c: normal(28.0, 2.0),
                    humidity_percent: normal(75.0, 10.0),
                    heat_stress_days: normal(3.0, 2.0),
                    dry_spells: normal(1.0, 1.0),
                },
                SeasonRegime {
                    season: AgroSeason::Rabi,
                    rainfall_mm: normal(200.0, 100.0),
                    avg_temperature_c: normal(25.0, 3.0),
                    humidity_percent: normal(60.0, 15.0),
                    heat_stress_days: normal(1.0, 1.0),
                    dry_spells: normal(3.0, 1.5),
                },
                SeasonRegime {
                    season: AgroSeason::Summer,
                    rainfall_mm: normal(100.0, 50.0),
                    avg_temperature_c: normal(32.0, 2.0),
                    humidity_percent: normal(50.0, 10.0),
                    heat_stress_days: normal(10.0, 4.0),
                    dry_spells: normal(4.0, 1.5),
                },
            ],
            soil_types: SoilType::ALL.to_vec(),
            soils: vec![
                SoilRegime {
                    family: SoilFamily::ClayLike,
                    ph: normal(6.8, 0.3),
                    organic_carbon: normal(2.5, 0.5),
                    nitrogen: normal(150.0, 30.0),
                },
                SoilRegime {
                    family: SoilFamily::Sandy,
                    ph: normal(6.2, 0.4),
                    organic_carbon: normal(1.2, 0.3),
                    nitrogen: normal(100.0, 25.0),
                },
                SoilRegime {
                    family: SoilFamily::Loamy,
                    ph: normal(6.5, 0.3),
                    organic_carbon: normal(1.8, 0.4),
                    nitrogen: normal(125.0, 25.0),
                },
            ],
            response: YieldResponse::default(),
            noise_std: 0.1,
            yield_floor: 1000.0,
            yield_ceiling: 6000.0,
            start_year: 2020,
            years: 4,
        }
    }
}

impl SynthesisConfig {
    fn validate(&self) -> Result<(), MlError> {
        if self.districts.is_empty() || self.seasons.is_empty() || self.soil_types.is_empty() {
            return Err(MlError::InvalidConfig(
                "synthesis needs at least one district, season and soil type".into(),
            ));
        }
        if self.yield_floor > self.yield_ceiling {
            return Err(MlError::InvalidConfig("yield floor exceeds ceiling".into()));
        }
        if self.years < 1 {
            return Err(MlError::InvalidConfig("years must be at least 1".into()));
        }
        Ok(())
    }

    fn soil_regime(&self, soil: SoilType) -> Result<&SoilRegime, MlError> {
        self.soils
            .iter()
            .find(|r| r.family == soil.family())
            .ok_or_else(|| {
                MlError::InvalidConfig(format!("no soil regime for {}", soil.name()))
            })
    }

    /// Noise-free label for a feature vector in a district
    pub fn expected_yield(&self, features: &FeatureVector, base_yield: f64) -> f64 {
        (base_yield * self.response.combined_multiplier(features))
            .clamp(self.yield_floor, self.yield_ceiling)
    }
}

/// Seeded sampler over `Gaussian` readings
struct Sampler {
    rng: ChaCha8Rng,
}

impl Sampler {
    fn draw(&mut self, n: Gaussian) -> Result<f64, MlError> {
        let dist = Normal::new(n.mean, n.std)
            .map_err(|e| MlError::InvalidConfig(format!("invalid normal({}, {}): {}", n.mean, n.std, e)))?;
        Ok(dist.sample(&mut self.rng))
    }

    fn bounded(&mut self, n: Gaussian, min: f64, max: f64) -> Result<f64, MlError> {
        Ok(self.draw(n)?.clamp(min, max))
    }

    fn count(&mut self, n: Gaussian) -> Result<f64, MlError> {
        Ok(self.draw(n)?.round().max(0.0))
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.rng.gen_range(low..high)
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.rng.gen_range(0..items.len())]
    }
}

fn texture_score(soil: SoilType) -> f64 {
    match soil {
        SoilType::Clay => 5.0,
        SoilType::SandyClay => 4.0,
        SoilType::Loamy | SoilType::RedSoil => 3.0,
        SoilType::SandyLoam => 2.0,
    }
}

/// Generate `n` labelled samples. The same `(seed, n, config)` always yields
/// identical samples.
pub fn synthesize(seed: u64, n: usize, config: &SynthesisConfig) -> Result<Vec<TrainingSample>, MlError> {
    config.validate()?;
    let mut s = Sampler {
        rng: ChaCha8Rng::seed_from_u64(seed),
    };
    let noise = normal(1.0, config.noise_std);

    let mut samples = Vec::with_capacity(n);
    for _ in 0..n {
        let district = s.pick(&config.districts).clone();
        let regime = s.pick(&config.seasons).clone();
        let soil = *s.pick(&config.soil_types);
        let soil_regime = config.soil_regime(soil)?.clone();

        // Calendar placement consistent with the season
        let month = *s.pick(regime.season.months());
        let day = s.rng.gen_range(1..=28);
        let year = config.start_year + s.rng.gen_range(0..config.years);
        let observed = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| MlError::InvalidConfig(format!("invalid date {}-{}-{}", year, month, day)))?;
        let days_since_planting = f64::from(s.rng.gen_range(30u32..150));

        let mut f = FeatureVector::defaults();

        // Weather
        let rainfall = s.bounded(regime.rainfall_mm, 0.0, 3000.0)?;
        let avg_temp = s.bounded(regime.avg_temperature_c, 10.0, 45.0)?;
        f.set(FeatureField::TotalRainfall, rainfall);
        f.set(FeatureField::AvgTemperature, avg_temp);
        f.set(FeatureField::MaxTemperature, avg_temp + s.draw(normal(5.0, 2.0))?.abs());
        f.set(FeatureField::MinTemperature, avg_temp - s.draw(normal(5.0, 2.0))?.abs());
        f.set(FeatureField::HeatStressDays, s.count(regime.heat_stress_days)?);
        f.set(FeatureField::DrySpellCount, s.count(regime.dry_spells)?);
        f.set(FeatureField::RainfallVariance, (rainfall / 30.0).powi(2) * s.uniform(0.5, 1.5));
        f.set(FeatureField::Humidity, s.bounded(regime.humidity_percent, 10.0, 100.0)?);

        // Soil
        f.set(FeatureField::SoilPh, s.bounded(soil_regime.ph, 4.0, 9.5)?);
        f.set(FeatureField::OrganicCarbon, s.bounded(soil_regime.organic_carbon, 0.1, 5.0)?);
        f.set(FeatureField::Nitrogen, s.bounded(soil_regime.nitrogen, 0.0, 400.0)?);
        f.set(FeatureField::Phosphorus, s.bounded(normal(25.0, 8.0), 0.0, 100.0)?);
        f.set(FeatureField::Potassium, s.bounded(normal(180.0, 40.0), 0.0, 500.0)?);
        f.set(FeatureField::SoilDepth, s.bounded(normal(120.0, 30.0), 20.0, 300.0)?);
        f.set(FeatureField::SoilTextureScore, texture_score(soil));
        let moisture = 20.0 + rainfall / 20.0 + s.draw(normal(0.0, 8.0))?;
        f.set(FeatureField::SoilMoisture, moisture.clamp(5.0, 95.0));

        // Satellite
        let ndvi = s.bounded(normal(0.6, 0.15), 0.05, 0.95)?;
        let evi = s.bounded(normal(0.4, 0.1), 0.05, 0.9)?;
        f.set(FeatureField::PeakNdvi, ndvi);
        f.set(FeatureField::TimeToPeakNdvi, s.bounded(normal(8.0, 2.0), 2.0, 16.0)?);
        f.set(FeatureField::IntegratedNdvi, ndvi * 8.0 * s.uniform(0.9, 1.1));
        f.set(FeatureField::PeakEvi, evi);
        f.set(FeatureField::TimeToPeakEvi, s.bounded(normal(8.0, 2.0), 2.0, 16.0)?);
        f.set(FeatureField::IntegratedEvi, evi * 8.0 * s.uniform(0.9, 1.1));

        // Temporal
        f.set(FeatureField::DaysSincePlanting, days_since_planting);
        f.set(FeatureField::SeasonEncoded, season_code_for_month(month));

        let label = (district.base_yield_kg_per_ha
            * config.response.combined_multiplier(&f)
            * s.draw(noise)?)
        .clamp(config.yield_floor, config.yield_ceiling);

        let observed_at = observed
            .and_hms_opt(6, 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt))
            .ok_or_else(|| MlError::InvalidConfig("invalid observation time".into()))?;
        samples.push(
            TrainingSample::new(f, label)
                .with_context(SampleContext::new(&district.name, regime.season.name(), soil.name()))
                .with_observed_at(observed_at),
        );
    }

    tracing::debug!(seed, n, "Synthesized training samples");
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_samples() {
        let config = SynthesisConfig::default();
        let a = synthesize(42, 200, &config).unwrap();
        let b = synthesize(42, 200, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seed_differs() {
        let config = SynthesisConfig::default();
        let a = synthesize(1, 50, &config).unwrap();
        let b = synthesize(2, 50, &config).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_labels_are_bounded_and_varied() {
        let samples = synthesize(7, 500, &SynthesisConfig::default()).unwrap();
        assert!(samples
            .iter()
            .all(|s| (1000.0..=6000.0).contains(&s.yield_kg_per_ha)));
        let min = samples.iter().map(|s| s.yield_kg_per_ha).fold(f64::MAX, f64::min);
        let max = samples.iter().map(|s| s.yield_kg_per_ha).fold(f64::MIN, f64::max);
        assert!(max - min > 1000.0);
    }

    #[test]
    fn test_context_and_calendar_agree() {
        let samples = synthesize(3, 300, &SynthesisConfig::default()).unwrap();
        for sample in &samples {
            let season = sample.context.season.as_deref().unwrap();
            let month = sample.observed_at.unwrap().format("%m").to_string().parse::<u32>().unwrap();
            let expected = AgroSeason::ALL.into_iter().find(|s| s.name() == season).unwrap();
            assert!(expected.months().contains(&month));
            assert!(sample.features.as_slice().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_expected_yield_monotonic_outside_ph_band() {
        let config = SynthesisConfig::default();
        let base = FeatureVector::defaults();
        let mut previous = f64::MAX;
        for step in 0..20 {
            let ph = 7.0 + step as f64 * 0.1;
            let y = config.expected_yield(&base.with(FeatureField::SoilPh, ph), 3600.0);
            assert!(y <= previous);
            previous = y;
        }
    }

    #[test]
    fn test_mean_label_drops_away_from_moisture_band() {
        let config = SynthesisConfig {
            noise_std: 0.0,
            ..SynthesisConfig::default()
        };
        let samples = synthesize(11, 200, &config).unwrap();
        let mean_at = |moisture: f64| {
            samples
                .iter()
                .map(|s| {
                    let f = s.features.with(FeatureField::SoilMoisture, moisture);
                    config.expected_yield(&f, 3600.0)
                })
                .sum::<f64>()
                / samples.len() as f64
        };
        assert!(mean_at(60.0) >= mean_at(75.0));
        assert!(mean_at(75.0) >= mean_at(90.0));
        assert!(mean_at(40.0) >= mean_at(20.0));
    }

    #[test]
    fn test_empty_tables_rejected() {
        let config = SynthesisConfig {
            districts: Vec::new(),
            ..SynthesisConfig::default()
        };
        assert!(matches!(synthesize(1, 10, &config), Err(MlError::InvalidConfig(_))));
    }
}
