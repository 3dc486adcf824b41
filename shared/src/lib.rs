//! Shared types and models for the Agri-Siddhi yield service
//!
//! This crate contains the pure parts of the pipeline shared between the
//! backend, the browser client (via WASM) and the training tools: the frozen
//! feature schema, categorical context, agronomic response curves and the
//! recommendation engine.

pub mod agronomy;
pub mod context;
pub mod features;
pub mod models;
pub mod recommendation;
pub mod types;
pub mod validation;

pub use agronomy::*;
pub use context::*;
pub use features::*;
pub use models::*;
pub use recommendation::*;
pub use types::*;
pub use validation::*;
