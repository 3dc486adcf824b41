//! Feature schema and normalization
//!
//! Every model in the platform consumes the same frozen, ordered feature
//! vector. Raw inputs arrive from sensors, weather and soil providers or CSV
//! uploads with arbitrary subsets of fields; the normalizer maps them onto the
//! schema, filling anything missing with documented agronomic defaults.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Version of the frozen feature layout
pub const SCHEMA_VERSION: u32 = 1;

/// Number of numeric fields produced by the normalizer
pub const FEATURE_COUNT: usize = 24;

/// Names of the categorical codes appended after the numeric fields
pub const CONTEXT_FEATURE_NAMES: [&str; 3] = ["district_code", "agro_season_code", "soil_type_code"];

/// Total width of a model input row
pub const MODEL_FEATURE_COUNT: usize = FEATURE_COUNT + CONTEXT_FEATURE_NAMES.len();

/// Default days since planting when no dates are known
pub const DEFAULT_DAYS_SINCE_PLANTING: f64 = 90.0;

/// Default season code when no reference date is known
pub const DEFAULT_SEASON_CODE: f64 = 1.0;

/// Source group a feature belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureBand {
    Weather,
    Soil,
    Satellite,
    Temporal,
}

/// A single position in the frozen feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureField {
    // Weather band
    TotalRainfall,
    AvgTemperature,
    MaxTemperature,
    MinTemperature,
    HeatStressDays,
    DrySpellCount,
    RainfallVariance,
    Humidity,
    // Soil band
    SoilPh,
    OrganicCarbon,
    Nitrogen,
    Phosphorus,
    Potassium,
    SoilDepth,
    SoilTextureScore,
    SoilMoisture,
    // Satellite band
    PeakNdvi,
    TimeToPeakNdvi,
    IntegratedNdvi,
    PeakEvi,
    TimeToPeakEvi,
    IntegratedEvi,
    // Derived temporal fields
    DaysSincePlanting,
    SeasonEncoded,
}

impl FeatureField {
    /// All fields in frozen schema order
    pub const ALL: [FeatureField; FEATURE_COUNT] = [
        FeatureField::TotalRainfall,
        FeatureField::AvgTemperature,
        FeatureField::MaxTemperature,
        FeatureField::MinTemperature,
        FeatureField::HeatStressDays,
        FeatureField::DrySpellCount,
        FeatureField::RainfallVariance,
        FeatureField::Humidity,
        FeatureField::SoilPh,
        FeatureField::OrganicCarbon,
        FeatureField::Nitrogen,
        FeatureField::Phosphorus,
        FeatureField::Potassium,
        FeatureField::SoilDepth,
        FeatureField::SoilTextureScore,
        FeatureField::SoilMoisture,
        FeatureField::PeakNdvi,
        FeatureField::TimeToPeakNdvi,
        FeatureField::IntegratedNdvi,
        FeatureField::PeakEvi,
        FeatureField::TimeToPeakEvi,
        FeatureField::IntegratedEvi,
        FeatureField::DaysSincePlanting,
        FeatureField::SeasonEncoded,
    ];

    /// Position of this field in the vector
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical snake_case name
    pub fn name(self) -> &'static str {
        match self {
            FeatureField::TotalRainfall => "total_rainfall",
            FeatureField::AvgTemperature => "avg_temperature",
            FeatureField::MaxTemperature => "max_temperature",
            FeatureField::MinTemperature => "min_temperature",
            FeatureField::HeatStressDays => "heat_stress_days",
            FeatureField::DrySpellCount => "dry_spell_count",
            FeatureField::RainfallVariance => "rainfall_variance",
            FeatureField::Humidity => "humidity",
            FeatureField::SoilPh => "soil_ph",
            FeatureField::OrganicCarbon => "organic_carbon",
            FeatureField::Nitrogen => "nitrogen",
            FeatureField::Phosphorus => "phosphorus",
            FeatureField::Potassium => "potassium",
            FeatureField::SoilDepth => "soil_depth",
            FeatureField::SoilTextureScore => "soil_texture_score",
            FeatureField::SoilMoisture => "soil_moisture",
            FeatureField::PeakNdvi => "peak_ndvi",
            FeatureField::TimeToPeakNdvi => "time_to_peak_ndvi",
            FeatureField::IntegratedNdvi => "integrated_ndvi",
            FeatureField::PeakEvi => "peak_evi",
            FeatureField::TimeToPeakEvi => "time_to_peak_evi",
            FeatureField::IntegratedEvi => "integrated_evi",
            FeatureField::DaysSincePlanting => "days_since_planting",
            FeatureField::SeasonEncoded => "season_encoded",
        }
    }

    pub fn band(self) -> FeatureBand {
        match self.index() {
            0..=7 => FeatureBand::Weather,
            8..=15 => FeatureBand::Soil,
            16..=21 => FeatureBand::Satellite,
            _ => FeatureBand::Temporal,
        }
    }

    /// Value used when the field is missing or not finite.
    ///
    /// Rainfall (50 mm) and organic carbon (0.7 %) sit well below the
    /// synthetic training regimes, so a request that omits them is scored on
    /// the floor of the rainfall and carbon response curves and lands near
    /// the low end of the yield range.
    pub fn default_value(self) -> f64 {
        match self {
            FeatureField::TotalRainfall => 50.0,
            FeatureField::AvgTemperature => 28.0,
            FeatureField::MaxTemperature => 35.0,
            FeatureField::MinTemperature => 22.0,
            FeatureField::HeatStressDays => 5.0,
            FeatureField::DrySpellCount => 2.0,
            FeatureField::RainfallVariance => 25.0,
            FeatureField::Humidity => 70.0,
            FeatureField::SoilPh => 7.0,
            FeatureField::OrganicCarbon => 0.7,
            FeatureField::Nitrogen => 110.0,
            FeatureField::Phosphorus => 22.0,
            FeatureField::Potassium => 170.0,
            FeatureField::SoilDepth => 120.0,
            FeatureField::SoilTextureScore => 4.0,
            FeatureField::SoilMoisture => 45.0,
            FeatureField::PeakNdvi => 0.6,
            FeatureField::TimeToPeakNdvi => 8.0,
            FeatureField::IntegratedNdvi => 4.8,
            FeatureField::PeakEvi => 0.4,
            FeatureField::TimeToPeakEvi => 8.0,
            FeatureField::IntegratedEvi => 3.2,
            FeatureField::DaysSincePlanting => DEFAULT_DAYS_SINCE_PLANTING,
            FeatureField::SeasonEncoded => DEFAULT_SEASON_CODE,
        }
    }

    /// Alternative names accepted from sensors and providers
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            FeatureField::TotalRainfall => &["rainfall", "rainfall_mm"],
            FeatureField::AvgTemperature => &["air_temperature", "temperature"],
            FeatureField::Humidity => &["air_humidity", "humidity_percent"],
            FeatureField::SoilPh => &["ph"],
            FeatureField::OrganicCarbon => &["organic_carbon_percent"],
            FeatureField::Nitrogen => &["nitrogen_kg_per_ha"],
            FeatureField::Phosphorus => &["phosphorus_kg_per_ha"],
            FeatureField::Potassium => &["potassium_kg_per_ha"],
            FeatureField::SoilDepth => &["depth"],
            FeatureField::SoilTextureScore => &["texture_score"],
            FeatureField::SoilMoisture => &["moisture_percent"],
            FeatureField::PeakNdvi => &["ndvi"],
            FeatureField::PeakEvi => &["evi"],
            _ => &[],
        }
    }

    /// Resolve a canonical name or alias, ignoring case and surrounding whitespace
    pub fn from_name(name: &str) -> Option<Self> {
        let key = name.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == key || f.aliases().iter().any(|a| *a == key))
    }

    fn is_canonical(self, name: &str) -> bool {
        self.name() == name.trim().to_ascii_lowercase()
    }
}

impl std::fmt::Display for FeatureField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered model feature names: the numeric schema followed by the categorical codes
pub fn model_feature_names() -> Vec<String> {
    FeatureField::ALL
        .iter()
        .map(|f| f.name().to_string())
        .chain(CONTEXT_FEATURE_NAMES.iter().map(|n| n.to_string()))
        .collect()
}

// ============================================================================
// Feature Vector
// ============================================================================

/// Fixed-order numeric feature vector. Never contains missing values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Vector with every field at its default
    pub fn defaults() -> Self {
        let mut values = [0.0; FEATURE_COUNT];
        for field in FeatureField::ALL {
            values[field.index()] = field.default_value();
        }
        Self { values }
    }

    pub fn get(&self, field: FeatureField) -> f64 {
        self.values[field.index()]
    }

    pub fn set(&mut self, field: FeatureField, value: f64) {
        self.values[field.index()] = value;
    }

    /// Builder-style variant of [`FeatureVector::set`]
    pub fn with(mut self, field: FeatureField, value: f64) -> Self {
        self.set(field, value);
        self
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureField, f64)> + '_ {
        FeatureField::ALL.iter().map(move |f| (*f, self.get(*f)))
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.name(), &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FeatureVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = HashMap::<String, f64>::deserialize(deserializer)?;
        let mut values = [0.0; FEATURE_COUNT];
        for field in FeatureField::ALL {
            values[field.index()] = *raw
                .get(field.name())
                .ok_or_else(|| de::Error::missing_field(field.name()))?;
        }
        Ok(Self { values })
    }
}

// ============================================================================
// Raw Inputs
// ============================================================================

/// Raw readings keyed by field name or alias.
///
/// Values may be numbers, numeric strings or null. Anything that does not
/// resolve to a finite number is treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawFeatures(BTreeMap<String, serde_json::Value>);

impl RawFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), serde_json::json!(value));
    }

    /// Record a field as explicitly missing
    pub fn insert_missing(&mut self, name: impl Into<String>) {
        self.0.insert(name.into(), serde_json::Value::Null);
    }

    pub fn insert_text(&mut self, name: impl Into<String>, value: &str) {
        self.0
            .insert(name.into(), serde_json::Value::String(value.to_string()));
    }

    /// Copy every entry of `other` over this one
    pub fn merge_from(&mut self, other: &RawFeatures) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Numeric value of an entry, if present and finite
    pub fn number(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(numeric)
    }

    /// Schema fields given a usable value under any of their names
    pub fn supplied_fields(&self) -> Vec<FeatureField> {
        let mut fields: Vec<FeatureField> = self
            .entries()
            .filter(|(_, value)| numeric(value).is_some())
            .filter_map(|(name, _)| FeatureField::from_name(name))
            .collect();
        fields.sort_unstable();
        fields.dedup();
        fields
    }

    /// Copy without any entry that resolves to one of `fields`
    pub fn without_fields(&self, fields: &[FeatureField]) -> RawFeatures {
        RawFeatures(
            self.0
                .iter()
                .filter(|(name, _)| FeatureField::from_name(name).map_or(true, |f| !fields.contains(&f)))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    fn entries(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for RawFeatures {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut raw = RawFeatures::new();
        for (k, v) in iter {
            raw.insert(k, v);
        }
        raw
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Dates used to derive the temporal fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalContext {
    pub planting_date: Option<NaiveDate>,
    pub reference_date: Option<NaiveDate>,
}

impl TemporalContext {
    pub fn new(planting_date: Option<NaiveDate>, reference_date: Option<NaiveDate>) -> Self {
        Self {
            planting_date,
            reference_date,
        }
    }
}

/// Season code for a calendar month: Dec-Feb 0, Mar-May 1, Jun-Aug 2, Sep-Nov 3
pub fn season_code_for_month(month: u32) -> f64 {
    match month {
        12 | 1 | 2 => 0.0,
        3..=5 => 1.0,
        6..=8 => 2.0,
        9..=11 => 3.0,
        _ => DEFAULT_SEASON_CODE,
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Result of normalizing one set of raw readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFeatures {
    pub vector: FeatureVector,
    /// Fields that fell back to their default
    pub defaulted: Vec<FeatureField>,
    /// Share of fields supplied by the caller, in [0, 1]
    pub completeness: f64,
}

impl NormalizedFeatures {
    pub fn is_complete(&self) -> bool {
        self.defaulted.is_empty()
    }
}

/// Maps raw readings onto the frozen schema
#[derive(Debug, Clone, Default)]
pub struct FeatureNormalizer {
    defaults: FeatureVector,
}

impl FeatureNormalizer {
    pub fn new() -> Self {
        Self {
            defaults: FeatureVector::defaults(),
        }
    }

    /// Normalizer with site-specific defaults
    pub fn with_defaults(defaults: FeatureVector) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &FeatureVector {
        &self.defaults
    }

    /// Build the feature vector. Never fails: unknown names are ignored and
    /// missing or non-finite values take the default.
    pub fn normalize(&self, raw: &RawFeatures, temporal: &TemporalContext) -> NormalizedFeatures {
        let mut supplied: [Option<(f64, bool)>; FEATURE_COUNT] = [None; FEATURE_COUNT];

        for (name, value) in raw.entries() {
            let Some(field) = FeatureField::from_name(name) else {
                tracing::debug!(field = %name, "Ignoring unknown raw feature");
                continue;
            };
            let Some(number) = numeric(value) else {
                continue;
            };
            let canonical = field.is_canonical(name);
            let slot = &mut supplied[field.index()];
            // Canonical names win over aliases.
            match slot {
                Some((_, true)) => {}
                Some((_, false)) if !canonical => {}
                _ => *slot = Some((number, canonical)),
            }
        }

        if supplied[FeatureField::DaysSincePlanting.index()].is_none() {
            if let (Some(planted), Some(reference)) = (temporal.planting_date, temporal.reference_date) {
                let days = (reference - planted).num_days().max(0) as f64;
                supplied[FeatureField::DaysSincePlanting.index()] = Some((days, true));
            }
        }
        if supplied[FeatureField::SeasonEncoded.index()].is_none() {
            if let Some(reference) = temporal.reference_date {
                let code = season_code_for_month(reference.month());
                supplied[FeatureField::SeasonEncoded.index()] = Some((code, true));
            }
        }

        let mut vector = self.defaults;
        let mut defaulted = Vec::new();
        for field in FeatureField::ALL {
            match supplied[field.index()] {
                Some((value, _)) => vector.set(field, value),
                None => defaulted.push(field),
            }
        }

        let completeness = 1.0 - defaulted.len() as f64 / FEATURE_COUNT as f64;
        NormalizedFeatures {
            vector,
            defaulted,
            completeness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_schema_order_is_frozen() {
        for (i, field) in FeatureField::ALL.iter().enumerate() {
            assert_eq!(field.index(), i);
        }
        assert_eq!(FeatureField::ALL[0].name(), "total_rainfall");
        assert_eq!(FeatureField::ALL[FEATURE_COUNT - 1].name(), "season_encoded");
        assert_eq!(model_feature_names().len(), MODEL_FEATURE_COUNT);
    }

    #[test]
    fn test_empty_input_gives_all_defaults() {
        let normalized = FeatureNormalizer::new().normalize(&RawFeatures::new(), &TemporalContext::default());
        assert_eq!(normalized.vector, FeatureVector::defaults());
        assert_eq!(normalized.defaulted.len(), FEATURE_COUNT);
        assert_eq!(normalized.completeness, 0.0);
        assert_eq!(normalized.vector.get(FeatureField::DaysSincePlanting), 90.0);
        assert_eq!(normalized.vector.get(FeatureField::SeasonEncoded), 1.0);
    }

    #[test]
    fn test_aliases_and_unknown_fields() {
        let raw: RawFeatures = [("air_temperature", 31.0), ("ph", 6.2), ("wind_speed", 4.0)]
            .into_iter()
            .collect();
        let normalized = FeatureNormalizer::new().normalize(&raw, &TemporalContext::default());
        assert_eq!(normalized.vector.get(FeatureField::AvgTemperature), 31.0);
        assert_eq!(normalized.vector.get(FeatureField::SoilPh), 6.2);
        assert_eq!(normalized.defaulted.len(), FEATURE_COUNT - 2);
    }

    #[test]
    fn test_canonical_name_beats_alias() {
        let raw: RawFeatures = [("ph", 5.0), ("soil_ph", 6.5)].into_iter().collect();
        let normalized = FeatureNormalizer::new().normalize(&raw, &TemporalContext::default());
        assert_eq!(normalized.vector.get(FeatureField::SoilPh), 6.5);
    }

    #[test]
    fn test_supplied_fields_resolve_aliases() {
        let mut raw: RawFeatures = [("ph", 6.0), ("rainfall", 300.0), ("soil_ph", 6.5)].into_iter().collect();
        raw.insert_missing("nitrogen");
        raw.insert("leaf_wetness", 3.0);
        assert_eq!(
            raw.supplied_fields(),
            vec![FeatureField::TotalRainfall, FeatureField::SoilPh]
        );

        let rest = raw.without_fields(&[FeatureField::SoilPh]);
        assert_eq!(rest.number("ph"), None);
        assert_eq!(rest.number("rainfall"), Some(300.0));
        assert_eq!(rest.number("leaf_wetness"), Some(3.0));
    }

    #[test]
    fn test_nan_null_and_text_values() {
        let mut raw = RawFeatures::new();
        raw.insert("nitrogen", f64::NAN);
        raw.insert_missing("phosphorus");
        raw.insert_text("potassium", " 140.5 ");
        raw.insert_text("soil_moisture", "wet");
        let normalized = FeatureNormalizer::new().normalize(&raw, &TemporalContext::default());
        assert_eq!(normalized.vector.get(FeatureField::Nitrogen), 110.0);
        assert_eq!(normalized.vector.get(FeatureField::Phosphorus), 22.0);
        assert_eq!(normalized.vector.get(FeatureField::Potassium), 140.5);
        assert_eq!(normalized.vector.get(FeatureField::SoilMoisture), 45.0);
        assert!(normalized.defaulted.contains(&FeatureField::Nitrogen));
    }

    #[test]
    fn test_temporal_derivation() {
        let temporal = TemporalContext::new(
            NaiveDate::from_ymd_opt(2024, 6, 1),
            NaiveDate::from_ymd_opt(2024, 7, 11),
        );
        let normalized = FeatureNormalizer::new().normalize(&RawFeatures::new(), &temporal);
        assert_eq!(normalized.vector.get(FeatureField::DaysSincePlanting), 40.0);
        assert_eq!(normalized.vector.get(FeatureField::SeasonEncoded), 2.0);
    }

    #[test]
    fn test_planting_after_reference_clamps_to_zero() {
        let temporal = TemporalContext::new(
            NaiveDate::from_ymd_opt(2024, 8, 1),
            NaiveDate::from_ymd_opt(2024, 7, 1),
        );
        let normalized = FeatureNormalizer::new().normalize(&RawFeatures::new(), &temporal);
        assert_eq!(normalized.vector.get(FeatureField::DaysSincePlanting), 0.0);
    }

    #[test]
    fn test_season_codes() {
        assert_eq!(season_code_for_month(12), 0.0);
        assert_eq!(season_code_for_month(1), 0.0);
        assert_eq!(season_code_for_month(4), 1.0);
        assert_eq!(season_code_for_month(7), 2.0);
        assert_eq!(season_code_for_month(10), 3.0);
    }

    #[test]
    fn test_vector_json_uses_field_names() {
        let vector = FeatureVector::defaults().with(FeatureField::Nitrogen, 42.0);
        let json = serde_json::to_value(vector).unwrap();
        assert_eq!(json["nitrogen"], 42.0);
        let back: FeatureVector = serde_json::from_value(json).unwrap();
        assert_eq!(back, vector);
    }

    fn raw_strategy() -> impl Strategy<Value = Vec<(usize, Option<f64>)>> {
        prop::collection::vec(
            (
                0..FEATURE_COUNT + 4,
                prop_oneof![
                    Just(None),
                    Just(Some(f64::NAN)),
                    Just(Some(f64::INFINITY)),
                    (-1000.0f64..1000.0).prop_map(Some),
                ],
            ),
            0..30,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any subset of fields yields a full-length vector with no missing values
        #[test]
        fn prop_normalized_vector_is_complete(entries in raw_strategy()) {
            let mut raw = RawFeatures::new();
            for (i, value) in entries {
                let name = FeatureField::ALL
                    .get(i)
                    .map(|f| f.name().to_string())
                    .unwrap_or_else(|| format!("unknown_{}", i));
                match value {
                    Some(v) => raw.insert(name, v),
                    None => raw.insert_missing(name),
                }
            }
            let normalized = FeatureNormalizer::new().normalize(&raw, &TemporalContext::default());
            prop_assert_eq!(normalized.vector.as_slice().len(), FEATURE_COUNT);
            prop_assert!(normalized.vector.as_slice().iter().all(|v| v.is_finite()));
            prop_assert!((0.0..=1.0).contains(&normalized.completeness));
        }
    }
}
