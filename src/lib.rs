//! Risk Scoring Service Library
//!
//! Serves real-time risk predictions from an ensemble of pre-trained binary
//! classifiers over raw tabular records of arbitrary shape. Raw rows are
//! deterministically aligned to the training-time matrix layout, scored by
//! every registered model independently, and persisted to an append-only
//! audit log under a traceable request identity.

pub mod aligner;
pub mod audit;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod recorder;
pub mod schema;
pub mod server;
pub mod types;

pub use aligner::{AlignedBatch, FeatureAligner};
pub use audit::{AuditSink, JsonlAuditSink};
pub use config::AppConfig;
pub use error::ScoringError;
pub use models::{ModelEnsemble, ModelLoader, RiskModel};
pub use recorder::RequestRecorder;
pub use schema::TrainingSchema;
pub use types::{PredictionRecord, RawRecord, RiskLabel, ScoreResult};
