//! Prediction record data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw tabular row: column name to scalar value (number, string, or null).
///
/// Incoming records have arbitrary shape; missing fields, unseen categories and
/// extra columns are all handled downstream by the aligner.
pub type RawRecord = serde_json::Map<String, Value>;

/// Human-readable verdict derived from a model probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLabel {
    #[serde(rename = "High Risk")]
    High,
    #[serde(rename = "Low Risk")]
    Low,
}

impl RiskLabel {
    /// Derive a label from a probability and decision threshold.
    ///
    /// Pure function of its inputs: labels can be re-derived from stored
    /// probabilities under a different threshold without rescoring.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            RiskLabel::High
        } else {
            RiskLabel::Low
        }
    }

    /// The label exactly as it appears in serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::High => "High Risk",
            RiskLabel::Low => "Low Risk",
        }
    }
}

/// One model's verdict for one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Registered model identifier
    pub model_id: String,

    /// Opaque version label attached at registration time
    pub model_version: String,

    /// Positive-class probability (0.0 - 1.0)
    pub probability: f64,

    /// Verdict at the configured decision threshold
    pub label: RiskLabel,
}

/// One scored row, assembled once and persisted exactly once.
///
/// All rows of the same batch share a request id and timestamp; each carries
/// the resolved (post-imputation) feature values and one [`ScoreResult`] per
/// ensemble member, in registration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Request identity, shared by every row of the batch
    pub request_id: String,

    /// Scoring timestamp (UTC), shared by every row of the batch
    pub timestamp: DateTime<Utc>,

    /// Caller-supplied customer identifier, if the envelope form was used
    pub customer_id: Option<String>,

    /// Caller-supplied feature-set version, if the envelope form was used
    pub features_version: Option<String>,

    /// The row's feature values after imputation, before matrix encoding
    pub features: RawRecord,

    /// Per-model verdicts, one per ensemble member
    pub results: Vec<ScoreResult>,
}
