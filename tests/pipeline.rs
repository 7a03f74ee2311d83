//! End-to-end tests for the scoring pipeline behind the HTTP surface.
//!
//! Models are stubbed behind the `RiskModel` trait and the audit sink is held
//! in memory, so these exercise decoding, alignment, ensemble scoring,
//! recording and response shaping without ONNX artifacts on disk.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use ndarray::Array2;
use risk_scoring_service::{
    aligner::FeatureAligner,
    error::ScoringError,
    metrics::PipelineMetrics,
    models::{ModelEnsemble, RiskModel},
    recorder::RequestRecorder,
    schema::{CategoricalVocabulary, NumericFillRange, TrainingSchema},
    server::{self, AppState},
    AuditSink, PredictionRecord,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Scores every row with a fixed probability.
struct ConstantModel(f64);

impl RiskModel for ConstantModel {
    fn predict_positive_probability(&self, matrix: &Array2<f32>) -> Result<Vec<f64>, ScoringError> {
        Ok(vec![self.0; matrix.nrows()])
    }
}

/// Audit sink that collects records in memory.
#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<PredictionRecord>>,
}

impl MemorySink {
    fn appended(&self) -> Vec<PredictionRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditSink for MemorySink {
    fn append(&self, record: &PredictionRecord) -> std::io::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn creature_schema() -> TrainingSchema {
    TrainingSchema {
        numeric_fill_ranges: vec![NumericFillRange {
            column: "number_of_policies".to_string(),
            min: 1,
            max: 5,
        }],
        categorical_vocabularies: vec![CategoricalVocabulary {
            column: "creature_type".to_string(),
            values: vec!["dragon".to_string(), "griffin".to_string()],
        }],
        output_columns: vec![
            "number_of_policies".to_string(),
            "creature_type_griffin".to_string(),
        ],
    }
}

fn test_app() -> (axum::Router, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());

    let mut ensemble = ModelEnsemble::new(0.5);
    ensemble.register("model_a", "1.0.0", Box::new(ConstantModel(0.2)));
    ensemble.register("model_b", "1.0.0", Box::new(ConstantModel(0.5)));
    ensemble.register("model_c", "1.0.0", Box::new(ConstantModel(0.9)));

    let state = Arc::new(AppState {
        aligner: FeatureAligner::new(creature_schema()),
        ensemble,
        recorder: RequestRecorder::new(sink.clone(), 0.5),
        metrics: Arc::new(PipelineMetrics::new()),
        seed: 42,
    });

    (server::router(state), sink)
}

async fn post_predict(app: axum::Router, payload: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_reports_model_count() {
    let (app, _) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["models"], 3);
}

#[tokio::test]
async fn test_single_row_returns_single_object() {
    let (app, sink) = test_app();

    let (status, body) = post_predict(
        app,
        json!({"number_of_policies": null, "creature_type": null}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // One row -> a single record object, not an array.
    assert!(body.is_object());
    assert!(body["request_id"].as_str().unwrap().starts_with("REQ_"));

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["model_id"], "model_a");
    assert_eq!(results[0]["label"], "Low Risk");
    assert_eq!(results[1]["label"], "High Risk");
    assert_eq!(results[2]["label"], "High Risk");

    // Imputed values are resolved in the audited features.
    let policies = body["features"]["number_of_policies"].as_i64().unwrap();
    assert!((1..=5).contains(&policies));
    let creature = body["features"]["creature_type"].as_str().unwrap();
    assert!(creature == "dragon" || creature == "griffin");

    let appended = sink.appended();
    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].request_id, body["request_id"].as_str().unwrap());
}

#[tokio::test]
async fn test_batch_shares_request_identity() {
    let (app, sink) = test_app();

    let (status, body) = post_predict(
        app,
        json!([
            {"number_of_policies": 1, "creature_type": "dragon"},
            {"number_of_policies": 2, "creature_type": "griffin"},
            {"number_of_policies": 3, "creature_type": "dragon"}
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 3);

    let request_id = records[0]["request_id"].as_str().unwrap();
    let timestamp = records[0]["timestamp"].clone();
    for record in records {
        assert_eq!(record["request_id"], request_id);
        assert_eq!(record["timestamp"], timestamp);
    }

    assert_eq!(sink.appended().len(), 3);
}

#[tokio::test]
async fn test_envelope_metadata_carried_through() {
    let (app, _) = test_app();

    let (status, body) = post_predict(
        app,
        json!({
            "customer_id": "cust_11",
            "features_version": "2024-09",
            "features": {"number_of_policies": 4, "creature_type": "griffin"}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["customer_id"], "cust_11");
    assert_eq!(body["features_version"], "2024-09");
}

#[tokio::test]
async fn test_empty_batch_rejected_without_persistence() {
    let (app, sink) = test_app();

    let (status, body) = post_predict(app, json!([])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("empty batch"));
    assert!(body["request_id"].as_str().unwrap().starts_with("REQ_"));
    assert!(sink.appended().is_empty());
}

#[tokio::test]
async fn test_invalid_payload_shape_rejected() {
    let (app, sink) = test_app();

    let (status, body) = post_predict(app, json!("just a string")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("invalid payload shape"));
    assert!(sink.appended().is_empty());
}

#[tokio::test]
async fn test_imputation_deterministic_across_requests() {
    let (app, _) = test_app();
    let payload = json!({"number_of_policies": null, "creature_type": null});

    let (_, first) = post_predict(app.clone(), payload.clone()).await;
    let (_, second) = post_predict(app, payload).await;

    // Same schema, seed and input: imputed features are identical even though
    // request identity and timestamp differ.
    assert_eq!(first["features"], second["features"]);
    assert_ne!(first["request_id"], second["request_id"]);
}
