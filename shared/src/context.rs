//! Categorical farm context: districts, agro-seasons and soil types
//!
//! The model sees these as integer codes. The code tables are frozen when a
//! model is trained and travel with its artifact, so a retrained model never
//! silently reinterprets a code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while encoding categorical context
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("Unknown {kind} '{value}'")]
    UnknownCategory { kind: CategoryKind, value: String },
}

/// Which categorical table a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    District,
    AgroSeason,
    SoilType,
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryKind::District => write!(f, "district"),
            CategoryKind::AgroSeason => write!(f, "agro_season"),
            CategoryKind::SoilType => write!(f, "soil_type"),
        }
    }
}

// ============================================================================
// Districts
// ============================================================================

/// Administrative district with its historical yield anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub name: String,
    pub state: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Typical paddy yield in kg/ha
    pub base_yield_kg_per_ha: f64,
}

impl District {
    fn tamil_nadu(name: &str, latitude: f64, longitude: f64, base_yield: f64) -> Self {
        Self {
            name: name.to_string(),
            state: "Tamil Nadu".to_string(),
            latitude,
            longitude,
            base_yield_kg_per_ha: base_yield,
        }
    }
}

/// Districts covered by the pilot
pub fn default_districts() -> Vec<District> {
    vec![
        District::tamil_nadu("Chennai", 13.0827, 80.2707, 4200.0),
        District::tamil_nadu("Coimbatore", 11.0168, 76.9558, 3800.0),
        District::tamil_nadu("Madurai", 9.9252, 78.1198, 3600.0),
        District::tamil_nadu("Salem", 11.6643, 78.1460, 3400.0),
        District::tamil_nadu("Tirunelveli", 8.7139, 77.7567, 3200.0),
        District::tamil_nadu("Erode", 11.3410, 77.7172, 3500.0),
        District::tamil_nadu("Tiruchirapalli", 10.7905, 78.7047, 3300.0),
        District::tamil_nadu("Thanjavur", 10.7869, 79.1378, 4000.0),
        District::tamil_nadu("Vellore", 12.9202, 79.1500, 3100.0),
    ]
}

/// Look up a district by name, ignoring case
pub fn find_district<'a>(districts: &'a [District], name: &str) -> Option<&'a District> {
    let name = name.trim();
    districts.iter().find(|d| d.name.eq_ignore_ascii_case(name))
}

/// Nearest district to a coordinate (flat-earth distance is enough at state scale)
pub fn nearest_district(districts: &[District], latitude: f64, longitude: f64) -> Option<&District> {
    districts.iter().min_by(|a, b| {
        let da = (a.latitude - latitude).powi(2) + (a.longitude - longitude).powi(2);
        let db = (b.latitude - latitude).powi(2) + (b.longitude - longitude).powi(2);
        da.total_cmp(&db)
    })
}

// ============================================================================
// Seasons and Soils
// ============================================================================

/// Indian cropping season
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgroSeason {
    Kharif,
    Rabi,
    Summer,
}

impl AgroSeason {
    pub const ALL: [AgroSeason; 3] = [AgroSeason::Kharif, AgroSeason::Rabi, AgroSeason::Summer];

    pub fn name(self) -> &'static str {
        match self {
            AgroSeason::Kharif => "Kharif",
            AgroSeason::Rabi => "Rabi",
            AgroSeason::Summer => "Summer",
        }
    }

    /// Months covered by the season
    pub fn months(self) -> &'static [u32] {
        match self {
            AgroSeason::Kharif => &[6, 7, 8, 9, 10],
            AgroSeason::Rabi => &[11, 12, 1, 2],
            AgroSeason::Summer => &[3, 4, 5],
        }
    }

    pub fn from_month(month: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|s| s.months().contains(&month))
            .unwrap_or(AgroSeason::Kharif)
    }
}

/// Soil classification used in the pilot districts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoilType {
    Clay,
    SandyClay,
    Loamy,
    SandyLoam,
    RedSoil,
}

/// Broad soil families that share nutrient regimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoilFamily {
    ClayLike,
    Sandy,
    Loamy,
}

impl SoilType {
    pub const ALL: [SoilType; 5] = [
        SoilType::Clay,
        SoilType::SandyClay,
        SoilType::Loamy,
        SoilType::SandyLoam,
        SoilType::RedSoil,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SoilType::Clay => "Clay",
            SoilType::SandyClay => "Sandy Clay",
            SoilType::Loamy => "Loamy",
            SoilType::SandyLoam => "Sandy Loam",
            SoilType::RedSoil => "Red Soil",
        }
    }

    pub fn family(self) -> SoilFamily {
        match self {
            SoilType::Clay | SoilType::SandyClay => SoilFamily::ClayLike,
            SoilType::SandyLoam => SoilFamily::Sandy,
            SoilType::Loamy | SoilType::RedSoil => SoilFamily::Loamy,
        }
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// Categorical context attached to a sample or prediction request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleContext {
    pub district: Option<String>,
    pub season: Option<String>,
    pub soil_type: Option<String>,
}

impl SampleContext {
    pub fn new(district: &str, season: &str, soil_type: &str) -> Self {
        Self {
            district: Some(district.to_string()),
            season: Some(season.to_string()),
            soil_type: Some(soil_type.to_string()),
        }
    }
}

/// One frozen value-to-code table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTable {
    kind: CategoryKind,
    values: Vec<String>,
    default: String,
}

impl CategoryTable {
    pub fn new(kind: CategoryKind, values: Vec<String>, default: &str) -> Self {
        let mut table = Self {
            kind,
            values,
            default: default.to_string(),
        };
        table.learn(default);
        table
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn default_value(&self) -> &str {
        &self.default
    }

    fn position(&self, value: &str) -> Option<usize> {
        let value = value.trim();
        self.values.iter().position(|v| v.eq_ignore_ascii_case(value))
    }

    /// Code for a value; absent values take the table default
    pub fn code(&self, value: Option<&str>) -> Result<f64, FeatureError> {
        let value = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => self.default.as_str(),
        };
        self.position(value)
            .map(|i| i as f64)
            .ok_or_else(|| FeatureError::UnknownCategory {
                kind: self.kind,
                value: value.to_string(),
            })
    }

    /// Append a value if it is not yet known. Only used while training.
    pub fn learn(&mut self, value: &str) {
        let value = value.trim();
        if !value.is_empty() && self.position(value).is_none() {
            self.values.push(value.to_string());
        }
    }
}

/// Frozen mapping from categorical context to model codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub districts: CategoryTable,
    pub seasons: CategoryTable,
    pub soil_types: CategoryTable,
}

impl CategoricalEncoder {
    /// Encoder seeded from the built-in reference tables
    pub fn standard() -> Self {
        Self {
            districts: CategoryTable::new(
                CategoryKind::District,
                default_districts().into_iter().map(|d| d.name).collect(),
                "Madurai",
            ),
            seasons: CategoryTable::new(
                CategoryKind::AgroSeason,
                AgroSeason::ALL.iter().map(|s| s.name().to_string()).collect(),
                AgroSeason::Kharif.name(),
            ),
            soil_types: CategoryTable::new(
                CategoryKind::SoilType,
                SoilType::ALL.iter().map(|s| s.name().to_string()).collect(),
                SoilType::Loamy.name(),
            ),
        }
    }

    /// Register values seen in training data
    pub fn learn(&mut self, context: &SampleContext) {
        if let Some(d) = &context.district {
            self.districts.learn(d);
        }
        if let Some(s) = &context.season {
            self.seasons.learn(s);
        }
        if let Some(s) = &context.soil_type {
            self.soil_types.learn(s);
        }
    }

    /// Codes in the order of `CONTEXT_FEATURE_NAMES`
    pub fn encode(&self, context: &SampleContext) -> Result<[f64; 3], FeatureError> {
        Ok([
            self.districts.code(context.district.as_deref())?,
            self.seasons.code(context.season.as_deref())?,
            self.soil_types.code(context.soil_type.as_deref())?,
        ])
    }
}

impl Default for CategoricalEncoder {
    fn default() -> Self {
        Self::standard()
    }
}
