//! ONNX model loading and the ONNX-backed [`RiskModel`] implementation

use crate::error::ScoringError;
use crate::models::ensemble::RiskModel;
use anyhow::{Context, Result};
use ndarray::Array2;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// A loaded ONNX binary classifier.
///
/// The session needs `&mut` to run, so it sits behind a mutex; concurrent
/// requests serialize per model, never per ensemble.
pub struct OnnxModel {
    id: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

/// Loader for ONNX model artifacts.
pub struct ModelLoader {
    /// Number of threads for ONNX inference per session
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a loader and initialize the ONNX runtime.
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load one model artifact and verify its scoring capability.
    ///
    /// The capability check happens here, at registration time: an artifact
    /// with no usable probability output is rejected at startup instead of
    /// failing on the first request.
    pub fn load_model<P: AsRef<Path>>(&self, path: P, id: &str) -> Result<OnnxModel> {
        let path = path.as_ref();

        info!(model = %id, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("model '{id}' declares no inputs, cannot score with it")
            })?;

        // A binary classifier exported to ONNX exposes probabilities either as
        // a dedicated output or as its last output. No candidate at all means
        // the artifact cannot satisfy the scoring contract.
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("model '{id}' declares no outputs, cannot score with it")
            })?;

        info!(
            model = %id,
            input = %input_name,
            output = %output_name,
            "Model loaded"
        );

        Ok(OnnxModel {
            id: id.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl RiskModel for OnnxModel {
    fn predict_positive_probability(&self, matrix: &Array2<f32>) -> Result<Vec<f64>, ScoringError> {
        use ort::value::Tensor;

        let rows = matrix.nrows();
        let shape = vec![rows as i64, matrix.ncols() as i64];
        let data: Vec<f32> = matrix.iter().copied().collect();

        let input_tensor =
            Tensor::from_array((shape, data)).map_err(|e| self.unsupported(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| self.unsupported(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(|e| self.unsupported(e.to_string()))?;

        // Preferred output first, then any non-label output. Tensor outputs
        // cover XGBoost-style exports; seq(map) covers sklearn ZipMap exports.
        if let Some(output) = outputs.get(&self.output_name) {
            if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                if let Some(probs) = positive_from_tensor(&dims, data, rows) {
                    debug!(model = %self.id, rows = rows, "Extracted probabilities from tensor");
                    return Ok(probs);
                }
            }
            if DynSequenceValueType::can_downcast(&output.dtype()) {
                if let Ok(probs) = positive_from_sequence_map(output, rows) {
                    debug!(model = %self.id, rows = rows, "Extracted probabilities from seq(map)");
                    return Ok(probs);
                }
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                if let Some(probs) = positive_from_tensor(&dims, data, rows) {
                    debug!(model = %self.id, output = %name, "Extracted probabilities (fallback)");
                    return Ok(probs);
                }
            }
            if DynSequenceValueType::can_downcast(&output.dtype()) {
                if let Ok(probs) = positive_from_sequence_map(&output, rows) {
                    return Ok(probs);
                }
            }
        }

        Err(self.unsupported("no output yields a positive-class probability".to_string()))
    }
}

impl OnnxModel {
    fn unsupported(&self, reason: String) -> ScoringError {
        ScoringError::UnsupportedModel {
            model: self.id.clone(),
            reason,
        }
    }
}

/// Pull the positive-class column out of a probability tensor.
///
/// Accepts `[rows, 2+]` (two-class probabilities, positive class at index 1),
/// `[rows, 1]`, and flat `[rows]` layouts. Returns `None` when the shape
/// cannot represent per-row probabilities for this batch.
fn positive_from_tensor(dims: &[i64], data: &[f32], rows: usize) -> Option<Vec<f64>> {
    match dims {
        [r, classes] if *r as usize == rows => {
            let classes = *classes as usize;
            if classes >= 2 && data.len() >= rows * classes {
                Some(
                    (0..rows)
                        .map(|i| data[i * classes + 1] as f64)
                        .collect(),
                )
            } else if classes == 1 && data.len() >= rows {
                Some((0..rows).map(|i| data[i] as f64).collect())
            } else {
                None
            }
        }
        [r] if *r as usize == rows && data.len() >= rows => {
            Some((0..rows).map(|i| data[i] as f64).collect())
        }
        _ => None,
    }
}

/// Extract positive-class probabilities from a `seq(map(int64, float))`
/// output, one map per row. This is the shape sklearn's ZipMap node (and
/// CatBoost/LightGBM exports) produce.
fn positive_from_sequence_map(output: &ort::value::DynValue, rows: usize) -> Result<Vec<f64>> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow::anyhow!("failed to downcast to sequence: {e}"))?;

    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    if maps.len() != rows {
        anyhow::bail!("sequence has {} maps for {} rows", maps.len(), rows);
    }

    let mut probabilities = Vec::with_capacity(rows);
    for map_value in &maps {
        let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;

        let positive = kv_pairs
            .iter()
            .find(|(class_id, _)| *class_id == 1)
            .map(|(_, prob)| *prob as f64)
            .or_else(|| {
                kv_pairs
                    .iter()
                    .find(|(class_id, _)| *class_id == 0)
                    .map(|(_, prob)| 1.0 - *prob as f64)
            })
            .ok_or_else(|| anyhow::anyhow!("no class probability found in map"))?;

        probabilities.push(positive);
    }

    Ok(probabilities)
}
