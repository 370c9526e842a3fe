//! Error types for the autosense-predict crate.

use autosense_core::types::FailureKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Invalid snapshot for vehicle {vehicle_id}: {reason}")]
    InvalidSnapshot { vehicle_id: String, reason: String },

    #[error("Model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PredictError {
    /// Map onto the run failure taxonomy. Anything that is not a bad
    /// snapshot means the scoring capability itself is broken.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PredictError::InvalidSnapshot { reason, .. } => FailureKind::InvalidSnapshot {
                reason: reason.clone(),
            },
            other => FailureKind::ModelUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, PredictError>;
