//! Domain models for the Agri-Siddhi yield service

mod prediction;
mod training;
mod weather;

pub use prediction::*;
pub use training::*;
pub use weather::*;
