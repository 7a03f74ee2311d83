//! Type definitions for the risk scoring service

pub mod record;

pub use record::{PredictionRecord, RawRecord, RiskLabel, ScoreResult};
