//! Model ensemble components

pub mod ensemble;
pub mod loader;

pub use ensemble::{ModelEnsemble, ModelScores, RiskModel};
pub use loader::{ModelLoader, OnnxModel};
