//! Risk Scoring Service - Main Entry Point
//!
//! Loads the training schema and ONNX model ensemble, opens the audit log,
//! and serves predictions over HTTP.

use anyhow::{Context, Result};
use risk_scoring_service::{
    aligner::FeatureAligner,
    config::AppConfig,
    metrics::{MetricsReporter, PipelineMetrics},
    models::{ModelEnsemble, ModelLoader},
    recorder::RequestRecorder,
    schema::TrainingSchema,
    server::{self, AppState},
    JsonlAuditSink,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("risk_scoring_service=info".parse()?),
        )
        .init();

    info!("Starting Risk Scoring Service");

    let config = AppConfig::load()?;
    info!(
        threshold = config.models.threshold,
        seed = config.alignment.seed,
        "Configuration loaded"
    );

    // Training schema: fixed reference data, loaded once, shared read-only.
    let schema = TrainingSchema::load_from_path(&config.alignment.schema_path)?;
    let aligner = FeatureAligner::new(schema);
    info!(
        output_columns = aligner.output_width(),
        "Feature aligner initialized"
    );

    // Every configured artifact must load; a missing model fails startup.
    let loader = ModelLoader::with_threads(config.models.onnx_threads)?;
    let mut ensemble = ModelEnsemble::new(config.models.threshold);
    for artifact in &config.models.artifacts {
        let path = Path::new(&config.models.models_dir).join(&artifact.file);
        let model = loader
            .load_model(&path, &artifact.id)
            .with_context(|| format!("Missing or unusable model file: {}", path.display()))?;
        ensemble.register(&artifact.id, &artifact.version, Box::new(model));
    }
    info!(
        count = ensemble.model_count(),
        models = ?ensemble.model_ids(),
        "Model ensemble initialized"
    );

    let sink = Arc::new(JsonlAuditSink::open(&config.audit.log_path)?);
    info!(path = %sink.path().display(), "Audit log opened");
    let recorder = RequestRecorder::new(sink, config.models.threshold);

    let metrics = Arc::new(PipelineMetrics::new());
    let reporter_metrics = metrics.clone();
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(reporter_metrics, 30);
        reporter.start().await;
    });

    let state = Arc::new(AppState {
        aligner,
        ensemble,
        recorder,
        metrics,
        seed: config.alignment.seed,
    });

    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
