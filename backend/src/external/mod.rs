//! External API integrations

pub mod ambee;
pub mod open_meteo;
pub mod provider;

pub use ambee::AmbeeSoilClient;
pub use open_meteo::OpenMeteoClient;
pub use provider::{overlay, ReadingsProvider, ReadingsQuery, ReadingsSource};
