//! Configuration management for the risk scoring service

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub alignment: AlignmentConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// Model ensemble configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing ONNX model files
    pub models_dir: String,
    /// Model artifacts, registered in listed order
    #[serde(default = "default_artifacts")]
    pub artifacts: Vec<ModelArtifactConfig>,
    /// Decision threshold for label derivation
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

/// One registered model artifact
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifactConfig {
    /// Identifier reported in score results
    pub id: String,
    /// Opaque version label attached at registration
    #[serde(default = "default_model_version")]
    pub version: String,
    /// File name inside `models_dir`
    pub file: String,
}

/// Feature-alignment configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AlignmentConfig {
    /// Path to the training schema JSON file
    pub schema_path: String,
    /// Seed for the imputation generator; fixed so alignment is reproducible
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Audit log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Path of the append-only JSONL prediction log
    #[serde(default = "default_audit_log")]
    pub log_path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_threshold() -> f64 {
    0.5
}

fn default_onnx_threads() -> usize {
    1
}

fn default_model_version() -> String {
    "1.0.0".to_string()
}

fn default_seed() -> u64 {
    42
}

fn default_audit_log() -> String {
    "predictions_log.jsonl".to_string()
}

fn default_artifacts() -> Vec<ModelArtifactConfig> {
    ["model_a", "model_b", "model_c"]
        .iter()
        .map(|id| ModelArtifactConfig {
            id: id.to_string(),
            version: default_model_version(),
            file: format!("{id}.onnx"),
        })
        .collect()
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: default_bind_addr(),
            },
            models: ModelsConfig {
                models_dir: "saved_models".to_string(),
                artifacts: default_artifacts(),
                threshold: default_threshold(),
                onnx_threads: 1,
            },
            alignment: AlignmentConfig {
                schema_path: "config/training_schema.json".to_string(),
                seed: default_seed(),
            },
            audit: AuditConfig {
                log_path: default_audit_log(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
