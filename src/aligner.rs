//! Feature alignment: raw tabular records to the training-time matrix layout.
//!
//! Incoming rows can be missing fields, carry unseen categories, or have extra
//! or omitted columns. The aligner deterministically imputes, one-hot encodes
//! and reindexes every batch into the exact column layout the models were
//! trained on. Pure transform: no I/O, and the only randomness is a generator
//! seeded per call so identical input and seed give bit-identical output.

use crate::error::ScoringError;
use crate::schema::{AlignmentPlan, ColumnSource, TrainingSchema};
use crate::types::RawRecord;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

/// Output of [`FeatureAligner::align`]: the model-ready matrix plus the
/// resolved tabular rows (post-imputation, pre-encoding) for the audit trail.
#[derive(Debug, Clone)]
pub struct AlignedBatch {
    /// Row-major numeric matrix, one row per input record, columns in the
    /// schema's fixed output order
    pub matrix: Array2<f32>,
    /// The input rows with imputed values filled in
    pub rows: Vec<RawRecord>,
}

/// Aligns raw record batches against a fixed training schema.
pub struct FeatureAligner {
    schema: TrainingSchema,
    plan: AlignmentPlan,
}

impl FeatureAligner {
    /// Build an aligner for a training schema. The alignment plan is computed
    /// once here; per-request work is an indexed fill over it.
    pub fn new(schema: TrainingSchema) -> Self {
        let plan = AlignmentPlan::from_schema(&schema);
        Self { schema, plan }
    }

    /// Number of columns every aligned matrix will have.
    pub fn output_width(&self) -> usize {
        self.plan.width()
    }

    /// Ordered output column names.
    pub fn output_columns(&self) -> &[String] {
        &self.schema.output_columns
    }

    /// Transform a batch of raw records into the training-schema matrix.
    ///
    /// Steps, in order: numeric imputation, categorical imputation, one-hot
    /// expansion, schema reindex, cast to f32. Unknown categories and unknown
    /// columns never error; they normalize to zero. An empty batch is
    /// rejected.
    pub fn align(&self, records: &[RawRecord], seed: u64) -> Result<AlignedBatch, ScoringError> {
        if records.is_empty() {
            return Err(ScoringError::EmptyBatch);
        }

        let mut rows = records.to_vec();
        let mut rng = StdRng::seed_from_u64(seed);

        self.impute_numeric(&mut rows, &mut rng);
        self.impute_categorical(&mut rows, &mut rng);
        let matrix = self.fill_matrix(&rows);

        Ok(AlignedBatch { matrix, rows })
    }

    /// Replace absent/null values in declared numeric columns with a uniform
    /// draw from the column's closed integer interval, then coerce present
    /// values to integers.
    ///
    /// A column no row carries is skipped entirely, so a batch of only unknown
    /// fields aligns to zeros instead of being synthesized from thin air.
    fn impute_numeric(&self, rows: &mut [RawRecord], rng: &mut StdRng) {
        for fill in &self.schema.numeric_fill_ranges {
            if !column_present(rows, &fill.column) {
                continue;
            }
            for row in rows.iter_mut() {
                match row.get(&fill.column) {
                    None | Some(Value::Null) => {
                        let drawn = rng.gen_range(fill.min..=fill.max);
                        row.insert(fill.column.clone(), Value::from(drawn));
                    }
                    Some(value) => {
                        if let Some(n) = value.as_f64() {
                            row.insert(fill.column.clone(), Value::from(n as i64));
                        }
                    }
                }
            }
        }
    }

    /// Replace absent/null values in declared categorical columns with a
    /// uniform draw (with replacement) from the column's vocabulary.
    fn impute_categorical(&self, rows: &mut [RawRecord], rng: &mut StdRng) {
        for vocab in &self.schema.categorical_vocabularies {
            if vocab.values.is_empty() || !column_present(rows, &vocab.column) {
                continue;
            }
            for row in rows.iter_mut() {
                if matches!(row.get(&vocab.column), None | Some(Value::Null)) {
                    let idx = rng.gen_range(0..vocab.values.len());
                    row.insert(
                        vocab.column.clone(),
                        Value::from(vocab.values[idx].clone()),
                    );
                }
            }
        }
    }

    /// Indexed fill against the alignment plan: one-hot expansion and schema
    /// reindex collapse into a single pass. Columns the schema knows but the
    /// row lacks become zero; row fields the schema does not know are dropped.
    fn fill_matrix(&self, rows: &[RawRecord]) -> Array2<f32> {
        let mut matrix = Array2::<f32>::zeros((rows.len(), self.plan.width()));

        for (i, row) in rows.iter().enumerate() {
            for (j, source) in self.plan.columns().iter().enumerate() {
                matrix[[i, j]] = match source {
                    ColumnSource::Direct { column } => row
                        .get(column)
                        .and_then(Value::as_f64)
                        .map(|n| n as f32)
                        .unwrap_or(0.0),
                    ColumnSource::Indicator { column, value } => {
                        match row.get(column).and_then(Value::as_str) {
                            Some(v) if v == value => 1.0,
                            _ => 0.0,
                        }
                    }
                };
            }
        }

        matrix
    }
}

/// True when at least one row in the batch carries the column. Mirrors
/// column-level (not cell-level) presence in tabular frames: a key missing
/// from every row means the column does not exist for this batch.
fn column_present(rows: &[RawRecord], column: &str) -> bool {
    rows.iter().any(|row| row.contains_key(column))
}
