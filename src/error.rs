//! Error types for the scoring pipeline

use thiserror::Error;

/// Failures surfaced to the caller of the scoring pipeline.
///
/// Alignment-time schema mismatches (unknown categories, missing columns) are
/// deliberately absent: those are normalized to zero/baseline instead of
/// rejected, so a malformed row never takes the service down.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// A batch with zero rows was submitted.
    #[error("empty batch: provide at least one row")]
    EmptyBatch,

    /// The request payload was neither an object nor an array of objects.
    #[error("invalid payload shape: {0}")]
    InvalidPayloadShape(String),

    /// A registered model cannot produce a positive-class probability vector.
    #[error("model '{model}' cannot produce positive-class probabilities: {reason}")]
    UnsupportedModel { model: String, reason: String },

    /// The audit sink failed partway through a batch. Rows appended before the
    /// failure stay recorded; `recorded` says how many made it.
    #[error("audit append failed after {recorded} of {total} rows: {source}")]
    PersistenceFailure {
        recorded: usize,
        total: usize,
        #[source]
        source: std::io::Error,
    },
}

impl ScoringError {
    /// HTTP status the serving layer should map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            ScoringError::EmptyBatch | ScoringError::InvalidPayloadShape(_) => 400,
            ScoringError::UnsupportedModel { .. } | ScoringError::PersistenceFailure { .. } => 500,
        }
    }
}
