//! Plant-side electrical models for offline simulation and testing.

pub mod model;

pub use model::{BldcModel, BldcModelConfig};
