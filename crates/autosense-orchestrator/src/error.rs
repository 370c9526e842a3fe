//! Error types for the autosense-orchestrator crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Audit error: {0}")]
    Audit(#[from] autosense_audit::AuditError),

    #[error("Record store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Prediction setup error: {0}")]
    Predict(#[from] autosense_predict::PredictError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for OrchestratorError {
    fn from(e: config::ConfigError) -> Self {
        OrchestratorError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
