//! Validation utilities for agronomic inputs

use rust_decimal::Decimal;

use crate::types::{GpsCoordinates, Page};

/// Largest page size served by history queries
pub const MAX_PAGE_LIMIT: u32 = 100;

// ============================================================================
// Location Validations
// ============================================================================

/// Validate GPS coordinates
pub fn validate_coordinates(coords: &GpsCoordinates) -> Result<(), &'static str> {
    if coords.latitude < Decimal::from(-90) || coords.latitude > Decimal::from(90) {
        return Err("Latitude must be between -90 and 90");
    }
    if coords.longitude < Decimal::from(-180) || coords.longitude > Decimal::from(180) {
        return Err("Longitude must be between -180 and 180");
    }
    Ok(())
}

// ============================================================================
// Agronomic Validations
// ============================================================================

/// Validate a yield label in kg/ha
pub fn validate_yield(yield_kg_per_ha: f64) -> Result<(), &'static str> {
    if !yield_kg_per_ha.is_finite() {
        return Err("Yield must be a finite number");
    }
    if yield_kg_per_ha <= 0.0 {
        return Err("Yield must be positive");
    }
    Ok(())
}

/// Validate soil pH is on the pH scale
pub fn validate_soil_ph(ph: f64) -> Result<(), &'static str> {
    if !(0.0..=14.0).contains(&ph) {
        return Err("Soil pH must be between 0 and 14");
    }
    Ok(())
}

/// Validate a percentage reading such as soil moisture or humidity
pub fn validate_percentage(value: f64) -> Result<(), &'static str> {
    if !(0.0..=100.0).contains(&value) {
        return Err("Percentage must be between 0 and 100");
    }
    Ok(())
}

/// Validate a vegetation index (NDVI/EVI)
pub fn validate_vegetation_index(value: f64) -> Result<(), &'static str> {
    if !(-1.0..=1.0).contains(&value) {
        return Err("Vegetation index must be between -1 and 1");
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate paging parameters
pub fn validate_page(page: &Page) -> Result<(), &'static str> {
    if page.limit == 0 || page.limit > MAX_PAGE_LIMIT {
        return Err("Limit must be between 1 and 100");
    }
    Ok(())
}

/// Validate a farm identifier
pub fn validate_farm_id(farm_id: &str) -> Result<(), &'static str> {
    let trimmed = farm_id.trim();
    if trimmed.is_empty() {
        return Err("Farm ID cannot be empty");
    }
    if trimmed.len() > 64 {
        return Err("Farm ID cannot exceed 64 characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_coordinates() {
        let ok = GpsCoordinates::new(Decimal::new(130827, 4), Decimal::new(802707, 4));
        assert!(validate_coordinates(&ok).is_ok());
        let bad = GpsCoordinates::new(Decimal::from(91), Decimal::ZERO);
        assert!(validate_coordinates(&bad).is_err());
        let bad = GpsCoordinates::new(Decimal::ZERO, Decimal::from(-181));
        assert!(validate_coordinates(&bad).is_err());
    }

    #[test]
    fn test_validate_yield() {
        assert!(validate_yield(3500.0).is_ok());
        assert!(validate_yield(0.0).is_err());
        assert!(validate_yield(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_ranges() {
        assert!(validate_soil_ph(6.5).is_ok());
        assert!(validate_soil_ph(15.0).is_err());
        assert!(validate_percentage(100.0).is_ok());
        assert!(validate_percentage(-1.0).is_err());
        assert!(validate_vegetation_index(0.7).is_ok());
        assert!(validate_vegetation_index(1.5).is_err());
    }

    #[test]
    fn test_validate_page_and_farm() {
        assert!(validate_page(&Page::default()).is_ok());
        assert!(validate_page(&Page { limit: 0, offset: 0 }).is_err());
        assert!(validate_page(&Page { limit: 101, offset: 0 }).is_err());
        assert!(validate_farm_id("farm-001").is_ok());
        assert!(validate_farm_id("  ").is_err());
    }
}
