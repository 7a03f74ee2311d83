//! HTTP serving layer: payload decoding, orchestration, response shaping
//!
//! Thin glue over the core: decode the request payload, run aligner ->
//! ensemble -> recorder, shape the response. Failures carry the request id
//! whenever one was allocated, so a caller can always trace a failed request
//! in the logs.

use crate::aligner::FeatureAligner;
use crate::error::ScoringError;
use crate::metrics::PipelineMetrics;
use crate::models::ModelEnsemble;
use crate::recorder::{new_request_id, RequestMetadata, RequestRecorder};
use crate::types::{PredictionRecord, RawRecord};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared state behind every request: read-only schema and models, the
/// recorder (whose sink serializes its own appends), and metrics.
pub struct AppState {
    pub aligner: FeatureAligner,
    pub ensemble: ModelEnsemble,
    pub recorder: RequestRecorder,
    pub metrics: Arc<PipelineMetrics>,
    /// Seed for the per-request imputation generator
    pub seed: u64,
}

pub type SharedState = Arc<AppState>;

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .with_state(state)
}

/// Liveness probe for monitoring and load balancers. No core logic.
async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "models": state.ensemble.model_count(),
    }))
}

/// Main prediction endpoint.
///
/// Accepts direct features (an object or an array of objects) or the wrapped
/// form `{"customer_id": ..., "features_version": ..., "features": ...}`.
/// Returns a single record object for a one-row batch, an array otherwise.
async fn predict(State(state): State<SharedState>, Json(payload): Json<Value>) -> Response {
    let request_id = new_request_id();
    let start = Instant::now();

    match run_pipeline(&state, &payload, &request_id) {
        Ok(records) => {
            state
                .metrics
                .record_request(start.elapsed(), records.len() as u64);
            for record in &records {
                for result in &record.results {
                    state
                        .metrics
                        .record_verdict(&result.model_id, result.label.as_str());
                }
            }

            info!(
                request_id = %request_id,
                rows = records.len(),
                elapsed_us = start.elapsed().as_micros(),
                "Request scored"
            );

            if records.len() == 1 {
                Json(&records[0]).into_response()
            } else {
                Json(&records).into_response()
            }
        }
        Err(err) => {
            state.metrics.record_failure();
            error!(request_id = %request_id, error = %err, "Request failed");

            let status = StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(json!({
                    "request_id": request_id,
                    "error": err.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Decode -> align -> score -> record. Synchronous and CPU-bound; each stage
/// is all-or-nothing, and no partial matrix or scores ever escape a failure.
fn run_pipeline(
    state: &AppState,
    payload: &Value,
    request_id: &str,
) -> Result<Vec<PredictionRecord>, ScoringError> {
    let (records, metadata) = decode_payload(payload)?;
    let aligned = state.aligner.align(&records, state.seed)?;
    let scores = state.ensemble.score(&aligned.matrix)?;
    state
        .recorder
        .record(request_id, &aligned.rows, &scores, &metadata)
}

/// Split a payload into feature rows and optional caller metadata.
///
/// An object carrying a `features` key is treated as the envelope form;
/// anything else is the feature row(s) directly.
pub fn decode_payload(payload: &Value) -> Result<(Vec<RawRecord>, RequestMetadata), ScoringError> {
    match payload {
        Value::Object(map) if map.contains_key("features") => {
            let metadata = RequestMetadata {
                customer_id: map
                    .get("customer_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                features_version: map
                    .get("features_version")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            };
            let rows = rows_from(&map["features"])?;
            Ok((rows, metadata))
        }
        other => Ok((rows_from(other)?, RequestMetadata::default())),
    }
}

/// A single object is one row; an array of objects is N rows.
fn rows_from(value: &Value) -> Result<Vec<RawRecord>, ScoringError> {
    match value {
        Value::Object(map) => Ok(vec![map.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                other => Err(ScoringError::InvalidPayloadShape(format!(
                    "array elements must be objects, got {}",
                    kind_of(other)
                ))),
            })
            .collect(),
        other => Err(ScoringError::InvalidPayloadShape(format!(
            "payload must be an object or an array of objects, got {}",
            kind_of(other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
