//! Request identity, response shaping, and audit persistence
//!
//! One request id and one UTC timestamp are minted per batch, not per row:
//! every row of a multi-row batch shares them. That keeps all rows of a
//! request joinable in the audit log under a single identity.

use crate::audit::AuditSink;
use crate::error::ScoringError;
use crate::models::ModelScores;
use crate::types::{PredictionRecord, RawRecord, RiskLabel, ScoreResult};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Generate a short unique request id (e.g. `REQ_a1b2c3d4e5f6`).
pub fn new_request_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("REQ_{}", &hex[..12])
}

/// Optional caller-supplied metadata carried into every record of a batch.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub customer_id: Option<String>,
    pub features_version: Option<String>,
}

/// Assembles and persists one [`PredictionRecord`] per scored row.
pub struct RequestRecorder {
    sink: Arc<dyn AuditSink>,
    threshold: f64,
}

impl RequestRecorder {
    /// Create a recorder writing to the given sink, deriving labels at the
    /// given decision threshold.
    pub fn new(sink: Arc<dyn AuditSink>, threshold: f64) -> Self {
        Self { sink, threshold }
    }

    /// Build and persist the records for one scored batch.
    ///
    /// Each record is appended to the sink before it is returned. A failed
    /// append aborts the batch: rows already appended stay recorded (no
    /// rollback, no retry), and the error reports how many made it.
    pub fn record(
        &self,
        request_id: &str,
        rows: &[RawRecord],
        scores: &[ModelScores],
        metadata: &RequestMetadata,
    ) -> Result<Vec<PredictionRecord>, ScoringError> {
        let timestamp = Utc::now();
        let mut records = Vec::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            let results: Vec<ScoreResult> = scores
                .iter()
                .map(|per_model| {
                    let probability = per_model.probabilities[i];
                    ScoreResult {
                        model_id: per_model.model_id.clone(),
                        model_version: per_model.model_version.clone(),
                        probability,
                        label: RiskLabel::from_probability(probability, self.threshold),
                    }
                })
                .collect();

            let record = PredictionRecord {
                request_id: request_id.to_string(),
                timestamp,
                customer_id: metadata.customer_id.clone(),
                features_version: metadata.features_version.clone(),
                features: row.clone(),
                results,
            };

            self.sink
                .append(&record)
                .map_err(|source| ScoringError::PersistenceFailure {
                    recorded: i,
                    total: rows.len(),
                    source,
                })?;

            records.push(record);
        }

        info!(
            request_id = %request_id,
            rows = records.len(),
            models = scores.len(),
            "Request recorded"
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Collects appended records in memory; optionally fails after a quota.
    struct MemorySink {
        records: Mutex<Vec<PredictionRecord>>,
        fail_after: Option<usize>,
    }

    impl MemorySink {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                fail_after: None,
            }
        }

        fn failing_after(n: usize) -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                fail_after: Some(n),
            }
        }

        fn appended(&self) -> Vec<PredictionRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl AuditSink for MemorySink {
        fn append(&self, record: &PredictionRecord) -> std::io::Result<()> {
            let mut records = self.records.lock().unwrap();
            if let Some(limit) = self.fail_after {
                if records.len() >= limit {
                    return Err(std::io::Error::other("sink unavailable"));
                }
            }
            records.push(record.clone());
            Ok(())
        }
    }

    fn three_rows() -> Vec<RawRecord> {
        (1..=3)
            .map(|n| {
                let mut row = RawRecord::new();
                row.insert("number_of_policies".to_string(), json!(n));
                row
            })
            .collect()
    }

    fn one_model_scores() -> Vec<ModelScores> {
        vec![ModelScores {
            model_id: "model_a".to_string(),
            model_version: "1.0.0".to_string(),
            probabilities: vec![0.2, 0.5, 0.9],
        }]
    }

    #[test]
    fn test_request_id_format_and_uniqueness() {
        let a = new_request_id();
        let b = new_request_id();

        assert!(a.starts_with("REQ_"));
        assert_eq!(a.len(), 16);
        assert!(a[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_batch_shares_identity_and_timestamp() {
        let sink = Arc::new(MemorySink::new());
        let recorder = RequestRecorder::new(sink.clone(), 0.5);
        let request_id = new_request_id();

        let records = recorder
            .record(
                &request_id,
                &three_rows(),
                &one_model_scores(),
                &RequestMetadata::default(),
            )
            .unwrap();

        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.request_id, request_id);
            assert_eq!(record.timestamp, records[0].timestamp);
            assert_eq!(record.results.len(), 1);
        }
        assert_eq!(sink.appended().len(), 3);
    }

    #[test]
    fn test_labels_follow_threshold() {
        let sink = Arc::new(MemorySink::new());
        let recorder = RequestRecorder::new(sink, 0.5);

        let records = recorder
            .record(
                "REQ_000000000000",
                &three_rows(),
                &one_model_scores(),
                &RequestMetadata::default(),
            )
            .unwrap();

        assert_eq!(records[0].results[0].label, RiskLabel::Low);
        assert_eq!(records[1].results[0].label, RiskLabel::High);
        assert_eq!(records[2].results[0].label, RiskLabel::High);
    }

    #[test]
    fn test_results_follow_registration_order() {
        let sink = Arc::new(MemorySink::new());
        let recorder = RequestRecorder::new(sink, 0.5);

        let scores = vec![
            ModelScores {
                model_id: "model_a".to_string(),
                model_version: "1.0.0".to_string(),
                probabilities: vec![0.1],
            },
            ModelScores {
                model_id: "model_b".to_string(),
                model_version: "1.0.0".to_string(),
                probabilities: vec![0.9],
            },
        ];

        let rows = vec![RawRecord::new()];
        let records = recorder
            .record("REQ_000000000000", &rows, &scores, &RequestMetadata::default())
            .unwrap();

        let ids: Vec<_> = records[0].results.iter().map(|r| r.model_id.as_str()).collect();
        assert_eq!(ids, vec!["model_a", "model_b"]);
    }

    #[test]
    fn test_midbatch_persistence_failure_keeps_recorded_prefix() {
        let sink = Arc::new(MemorySink::failing_after(1));
        let recorder = RequestRecorder::new(sink.clone(), 0.5);

        let err = recorder
            .record(
                "REQ_000000000000",
                &three_rows(),
                &one_model_scores(),
                &RequestMetadata::default(),
            )
            .unwrap_err();

        match err {
            ScoringError::PersistenceFailure { recorded, total, .. } => {
                assert_eq!(recorded, 1);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The durably appended prefix stays recorded.
        assert_eq!(sink.appended().len(), 1);
    }

    #[test]
    fn test_metadata_carried_into_every_record() {
        let sink = Arc::new(MemorySink::new());
        let recorder = RequestRecorder::new(sink, 0.5);
        let metadata = RequestMetadata {
            customer_id: Some("cust_7".to_string()),
            features_version: Some("v3".to_string()),
        };

        let records = recorder
            .record("REQ_000000000000", &three_rows(), &one_model_scores(), &metadata)
            .unwrap();

        for record in &records {
            assert_eq!(record.customer_id.as_deref(), Some("cust_7"));
            assert_eq!(record.features_version.as_deref(), Some("v3"));
        }
    }
}
