//! Multi-model ensemble scoring
//!
//! Each registered model scores every row independently; verdicts are reported
//! per model and never blended, voted on, or averaged across the ensemble.

use crate::error::ScoringError;
use ndarray::Array2;
use tracing::debug;

/// Capability every ensemble member must implement.
///
/// Declared at registration time rather than probed per request: a model that
/// cannot produce a two-class probability output never makes it into the
/// ensemble.
pub trait RiskModel: Send + Sync {
    /// Positive-class probability for each row of the matrix, in row order.
    /// Every entry lies in [0, 1]; the vector length equals the row count.
    fn predict_positive_probability(&self, matrix: &Array2<f32>) -> Result<Vec<f64>, ScoringError>;
}

/// A model plus the identity it was registered under.
struct RegisteredModel {
    id: String,
    version: String,
    model: Box<dyn RiskModel>,
}

/// One model's probability vector for a scored batch.
#[derive(Debug, Clone)]
pub struct ModelScores {
    /// Registered model identifier
    pub model_id: String,
    /// Opaque version label attached at registration
    pub model_version: String,
    /// Positive-class probability per row, in row order
    pub probabilities: Vec<f64>,
}

/// Ordered registry of independently-trained binary classifiers.
pub struct ModelEnsemble {
    models: Vec<RegisteredModel>,
    threshold: f64,
}

impl ModelEnsemble {
    /// Create an empty ensemble with the given decision threshold.
    pub fn new(threshold: f64) -> Self {
        Self {
            models: Vec::new(),
            threshold,
        }
    }

    /// Register a model. Scoring order and result order follow registration
    /// order. The version is an opaque label, not discovered from the model.
    pub fn register(&mut self, id: &str, version: &str, model: Box<dyn RiskModel>) {
        self.models.push(RegisteredModel {
            id: id.to_string(),
            version: version.to_string(),
            model,
        });
    }

    /// Decision threshold used for label derivation.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of registered models.
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Registered model identifiers, in registration order.
    pub fn model_ids(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.id.as_str()).collect()
    }

    /// Score an aligned matrix with every registered model.
    ///
    /// Returns one probability vector per model, in registration order. A
    /// model failure fails the whole call; no partial scores are returned.
    pub fn score(&self, matrix: &Array2<f32>) -> Result<Vec<ModelScores>, ScoringError> {
        let rows = matrix.nrows();
        let mut results = Vec::with_capacity(self.models.len());

        for registered in &self.models {
            let probabilities = registered.model.predict_positive_probability(matrix)?;

            if probabilities.len() != rows {
                return Err(ScoringError::UnsupportedModel {
                    model: registered.id.clone(),
                    reason: format!(
                        "returned {} probabilities for {} rows",
                        probabilities.len(),
                        rows
                    ),
                });
            }

            debug!(
                model = %registered.id,
                rows = rows,
                "Model scored batch"
            );

            results.push(ModelScores {
                model_id: registered.id.clone(),
                model_version: registered.version.clone(),
                probabilities,
            });
        }

        Ok(results)
    }
}
