use std::path::PathBuf;

use likeness_core::EngineConfig;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite registry database.
    pub db_path: PathBuf,
    /// Permit the one-time detector model download.
    pub allow_download: bool,
    /// Primary detector confidence threshold.
    pub detector_confidence: f32,
    /// Acceptance threshold for classical-backend search.
    pub classical_threshold: f32,
    /// Acceptance threshold for embedding-backend search.
    pub embedding_threshold: f32,
}

impl Config {
    /// Load configuration from `LIKENESS_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("LIKENESS_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| likeness_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("likeness");

        let db_path = std::env::var("LIKENESS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("registry.db"));

        Self {
            model_dir,
            db_path,
            allow_download: std::env::var("LIKENESS_ALLOW_DOWNLOAD")
                .map(|v| v != "0")
                .unwrap_or(true),
            detector_confidence: env_f32("LIKENESS_DETECTOR_CONFIDENCE", 0.5),
            classical_threshold: env_f32("LIKENESS_CLASSICAL_THRESHOLD", 70.0),
            embedding_threshold: env_f32("LIKENESS_EMBEDDING_THRESHOLD", 90.0),
        }
    }

    /// Engine parameters derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            model_dir: self.model_dir.clone(),
            allow_download: self.allow_download,
            detector_confidence: self.detector_confidence,
            classical_threshold: self.classical_threshold,
            embedding_threshold: self.embedding_threshold,
            ..EngineConfig::default()
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
