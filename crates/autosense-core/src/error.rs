use thiserror::Error;

/// Top-level error type for the AutoSense platform.
#[derive(Error, Debug)]
pub enum AutosenseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
