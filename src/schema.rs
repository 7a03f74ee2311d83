//! Training-time schema reference data and the alignment plan built from it.
//!
//! The schema is loaded once at startup and shared read-only by all requests.
//! It is supplied as fixed reference data from the training pipeline, never
//! inferred from incoming traffic.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Closed integer interval used to impute a missing numeric value.
#[derive(Debug, Clone, Deserialize)]
pub struct NumericFillRange {
    /// Column name
    pub column: String,
    /// Inclusive lower bound
    pub min: i64,
    /// Inclusive upper bound
    pub max: i64,
}

/// Ordered set of category values observed for a column at training time.
///
/// The first value is the one-hot baseline and generates no indicator column.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoricalVocabulary {
    /// Column name
    pub column: String,
    /// Values in the fixed training-time order
    pub values: Vec<String>,
}

/// Immutable reference data describing the matrix layout the models expect.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingSchema {
    /// Numeric columns that receive synthetic imputation, in declaration order
    #[serde(default)]
    pub numeric_fill_ranges: Vec<NumericFillRange>,

    /// Categorical columns with known vocabularies, in declaration order
    #[serde(default)]
    pub categorical_vocabularies: Vec<CategoricalVocabulary>,

    /// Exact ordered column layout of the trained models, one-hot columns included
    pub output_columns: Vec<String>,
}

impl TrainingSchema {
    /// Load the schema from a JSON file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read training schema from {}", path.display()))?;
        let schema: TrainingSchema = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse training schema {}", path.display()))?;
        Ok(schema)
    }

    /// Vocabulary for a categorical column, if the column is known.
    pub fn vocabulary(&self, column: &str) -> Option<&[String]> {
        self.categorical_vocabularies
            .iter()
            .find(|v| v.column == column)
            .map(|v| v.values.as_slice())
    }
}

/// Where one output matrix column gets its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSource {
    /// Numeric value taken straight from the named record field (0.0 if absent
    /// or non-numeric)
    Direct { column: String },
    /// One-hot indicator: 1.0 when the named field equals `value`, else 0.0
    Indicator { column: String, value: String },
}

/// Ordered list of typed column descriptors, built once from the schema.
///
/// Alignment becomes an indexed fill over this plan: each output column knows
/// where its value comes from, so no dynamic column add/drop happens per
/// request.
#[derive(Debug, Clone)]
pub struct AlignmentPlan {
    columns: Vec<ColumnSource>,
}

impl AlignmentPlan {
    /// Build the plan from the training schema.
    ///
    /// An output column named `<cat>_<value>` where `<value>` is a non-baseline
    /// vocabulary entry of categorical column `<cat>` becomes an indicator;
    /// everything else is a direct numeric column.
    pub fn from_schema(schema: &TrainingSchema) -> Self {
        let columns = schema
            .output_columns
            .iter()
            .map(|name| Self::classify(name, schema))
            .collect();
        Self { columns }
    }

    fn classify(name: &str, schema: &TrainingSchema) -> ColumnSource {
        for vocab in &schema.categorical_vocabularies {
            let prefix = format!("{}_", vocab.column);
            if let Some(value) = name.strip_prefix(&prefix) {
                // The baseline (first) value never gets an indicator column.
                if vocab.values.iter().skip(1).any(|v| v == value) {
                    return ColumnSource::Indicator {
                        column: vocab.column.clone(),
                        value: value.to_string(),
                    };
                }
            }
        }
        ColumnSource::Direct {
            column: name.to_string(),
        }
    }

    /// Output column descriptors, in matrix order.
    pub fn columns(&self) -> &[ColumnSource] {
        &self.columns
    }

    /// Number of output matrix columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}
