//! HTTP request handlers for the Agri-Siddhi yield service

pub mod districts;
pub mod health;
pub mod models;
pub mod predictions;
pub mod recommendations;

pub use districts::*;
pub use health::*;
pub use models::*;
pub use predictions::*;
pub use recommendations::*;
